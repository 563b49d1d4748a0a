//! Interactive console menu.
//!
//! Shown when no subcommand is given. Each line read is one choice; anything
//! that is not one of the listed numbers is rejected and the prompt repeats.
//! End of input leaves the menu.

use std::fmt;
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::orchestrator::error_chain;

/// Printed after rejected input.
pub const INVALID_INPUT: &str = "invalid input, please try again";

/// Printed before the error chain of a failed operation.
pub const OPERATION_FAILED: &str = "The operation failed. Details:";

/// An operation picked from the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    /// `0`: full install.
    Install,
    /// `1`: refresh with the configured endpoint source.
    Refresh,
    /// `2`: refresh with the other endpoint source.
    RefreshAlternate,
    /// `3`: full uninstall.
    Uninstall,
}

impl MenuChoice {
    /// Choices in menu order; the index is the number typed.
    pub const ALL: [MenuChoice; 4] = [
        MenuChoice::Install,
        MenuChoice::Refresh,
        MenuChoice::RefreshAlternate,
        MenuChoice::Uninstall,
    ];
}

impl fmt::Display for MenuChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MenuChoice::Install => "Install",
            MenuChoice::Refresh => "Refresh upstream endpoint",
            MenuChoice::RefreshAlternate => "Refresh upstream endpoint (alternate source)",
            MenuChoice::Uninstall => "Uninstall",
        };
        f.write_str(label)
    }
}

/// Menu input errors.
#[derive(Debug, Error)]
pub enum MenuError {
    /// The line is not a listed option number.
    #[error("Invalid menu input `{input}`")]
    InputFormat {
        /// The rejected line, trimmed.
        input: String,
    },

    /// Reading the console or writing the prompt failed.
    #[error("Console I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Parse one input line into a choice.
pub fn parse_choice(line: &str) -> Result<MenuChoice, MenuError> {
    let input = line.trim();
    input
        .parse::<usize>()
        .ok()
        .and_then(|index| MenuChoice::ALL.get(index).copied())
        .ok_or_else(|| MenuError::InputFormat {
            input: input.to_string(),
        })
}

/// The menu loop over any line-based console.
pub struct Menu<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Menu<R, W> {
    /// Menu reading from `input` and printing to `output`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print the options and prompt.
    pub fn render(&mut self) -> io::Result<()> {
        writeln!(self.output)?;
        for (index, choice) in MenuChoice::ALL.iter().enumerate() {
            writeln!(self.output, "  {index}. {choice}")?;
        }
        write!(self.output, "Select an option: ")?;
        self.output.flush()
    }

    /// Read until a valid choice is entered. `None` at end of input.
    pub fn next_choice(&mut self) -> Result<Option<MenuChoice>, MenuError> {
        loop {
            self.render()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Ok(None);
            }
            match parse_choice(&line) {
                Ok(choice) => return Ok(Some(choice)),
                Err(MenuError::InputFormat { input }) => {
                    tracing::debug!("Rejected menu input {:?}", input);
                    writeln!(self.output, "{INVALID_INPUT}")?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run `handle` for each choice until end of input.
    ///
    /// A failed operation is reported with its full error chain and the menu
    /// is shown again.
    pub fn run<F, E>(&mut self, mut handle: F) -> Result<(), MenuError>
    where
        F: FnMut(MenuChoice) -> Result<(), E>,
        E: std::error::Error,
    {
        while let Some(choice) = self.next_choice()? {
            match handle(choice) {
                Ok(()) => writeln!(self.output, "{choice}: done")?,
                Err(e) => {
                    writeln!(self.output, "{OPERATION_FAILED}")?;
                    writeln!(self.output, "{}", error_chain(&e))?;
                }
            }
        }
        Ok(())
    }
}
