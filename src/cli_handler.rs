//! Command dispatch for redirect-setup.
//!
//! Maps each subcommand (or a menu choice) onto one orchestrator operation.

use anyhow::{Context, Result};
use std::io;

use crate::cli::Commands;
use crate::menu::{Menu, MenuChoice};
use crate::orchestrator::{Orchestrator, OrchestratorError};

/// Run `command`, or the interactive menu when there is none.
pub fn handle_command(command: Option<Commands>, orchestrator: &Orchestrator) -> Result<()> {
    match command {
        Some(Commands::Install) => orchestrator.install().context("Install failed"),
        Some(Commands::Refresh { alternate }) => {
            orchestrator.refresh(alternate).context("Refresh failed")
        }
        Some(Commands::Uninstall) => orchestrator.uninstall().context("Uninstall failed"),
        Some(Commands::Status) => {
            let report = orchestrator
                .status()
                .context("Failed to read install status")?;
            print!("{report}");
            Ok(())
        }
        None => run_menu(orchestrator),
    }
}

/// Run the interactive menu on the console until end of input.
fn run_menu(orchestrator: &Orchestrator) -> Result<()> {
    let stdin = io::stdin();
    Menu::new(stdin.lock(), io::stdout())
        .run(|choice| run_choice(orchestrator, choice))
        .context("Interactive menu failed")
}

fn run_choice(orchestrator: &Orchestrator, choice: MenuChoice) -> Result<(), OrchestratorError> {
    match choice {
        MenuChoice::Install => orchestrator.install(),
        MenuChoice::Refresh => orchestrator.refresh(false),
        MenuChoice::RefreshAlternate => orchestrator.refresh(true),
        MenuChoice::Uninstall => orchestrator.uninstall(),
    }
}
