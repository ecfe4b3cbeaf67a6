//! The line-oriented shell.
//!
//! Plain stdin/stdout, one command per line, prompt `db > `. No terminal
//! raw mode: the shell must behave identically through a pipe, which is how
//! the integration tests drive it. All diagnostics go to the tracing log;
//! stdout carries nothing but the protocol.

pub mod history;

use crate::errors::Error;
use crate::statement::{self, Statement};
use crate::storage::table::Table;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

enum MetaCommandResult {
    Success,
    Exit,
    Unrecognized,
}

/// Runs the shell until `.exit` or end of input, then closes the table.
pub fn start(table: &mut Table, history_path: Option<PathBuf>) -> Result<(), Error> {
    let session_id = Uuid::new_v4();
    info!(%session_id, "starting shell session");

    if let Some(path) = &history_path {
        if let Err(e) = history::ensure_file(path) {
            warn!(error = %e, "could not create history file");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    loop {
        print!("db > ");
        stdout.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            // End of input: behave like a clean exit.
            break;
        }
        let input = line.trim();

        if let Some(path) = &history_path {
            if !input.is_empty() {
                if let Err(e) = history::append(input, path) {
                    warn!(error = %e, "could not append to history file");
                }
            }
        }

        if input.starts_with('.') {
            match do_meta_command(input, table)? {
                MetaCommandResult::Success => continue,
                MetaCommandResult::Exit => break,
                MetaCommandResult::Unrecognized => {
                    println!("Unrecognized command '{}'.", input);
                    continue;
                }
            }
        }

        match statement::prepare(input) {
            Ok(stmt) => execute_statement(stmt, table)?,
            Err(e) => println!("{}", e),
        }
    }

    table.close()?;
    info!(%session_id, "shell session ended");
    Ok(())
}

fn do_meta_command(input: &str, table: &mut Table) -> Result<MetaCommandResult, Error> {
    match input {
        ".exit" => Ok(MetaCommandResult::Exit),
        ".btree" => {
            print!("{}", table.btree_to_string()?);
            Ok(MetaCommandResult::Success)
        }
        _ => Ok(MetaCommandResult::Unrecognized),
    }
}

/// Runs one prepared statement. `DuplicateKey` and `TableFull` are ordinary
/// shell results; everything else is fatal and propagates.
fn execute_statement(stmt: Statement, table: &mut Table) -> Result<(), Error> {
    match stmt {
        Statement::Insert(row) => match table.insert(&row) {
            Ok(()) => println!("Executed."),
            Err(Error::DuplicateKey) => println!("Error: Duplicate key."),
            Err(Error::TableFull) => println!("Error: Table full."),
            Err(e) => return Err(e),
        },
        Statement::Select => {
            for row in table.select()? {
                println!("{}", row);
            }
            println!("Executed.");
        }
    }
    Ok(())
}
