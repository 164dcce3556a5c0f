// src/repl.rs
//
// Interactive front-end: walks one session through the pipeline
// step by step on stdin/stdout. All splitting logic lives in the
// pipeline; this file only prompts, relays commands, and renders.

use crate::config::Config;
use crate::extract::VisionExtractor;
use crate::pipeline::{PipelineError, PipelineState};
use crate::report;
use crate::session_db::SessionStore;
use std::io::{self, BufRead, Write};
use tracing::info;

pub async fn run(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let extractor = VisionExtractor::new(cfg.extraction.clone());
    let store = SessionStore::new(&cfg.db_path)?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut state = PipelineState::new();

    println!("Invoice Split — split an invoice photo with your friends.");

    // Step 1: collect friends
    println!("\nAdd the friends splitting this invoice (blank line to finish).");
    loop {
        let name = prompt(&mut lines, "Friend name: ")?;
        if name.is_empty() {
            if state.roster().is_empty() {
                println!("Add at least one friend first.");
                continue;
            }
            break;
        }
        match state.add_participant(&name) {
            Ok(()) => println!("Added {name} to the list."),
            Err(e) => println!("{e}"),
        }
    }

    let session_id = {
        let names: Vec<&str> = state.roster().names().collect();
        SessionStore::fresh_session_id(&names)
    };
    info!(session = %session_id, "Session started");

    // Step 2: who paid
    loop {
        let payer = prompt(&mut lines, "\nWho paid the bill? ")?;
        if payer.is_empty() {
            continue;
        }
        match state.set_payer(&payer) {
            Ok(()) => {
                println!("{payer} is marked as the payer.");
                break;
            }
            Err(e) => println!("{e}"),
        }
    }
    store.save(&session_id, &state)?;

    // Step 3: the invoice photo
    loop {
        let path = prompt(&mut lines, "\nPath to the invoice image (jpeg): ")?;
        if path.is_empty() {
            continue;
        }
        let image = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                println!("Could not read {path}: {e}");
                continue;
            }
        };

        println!("Processing your invoice...");
        match state.submit_invoice_image(&image, &extractor).await {
            Ok(()) => break,
            Err(e @ PipelineError::Parse(_)) => {
                println!("Could not read the invoice ({e}). Try another photo.");
            }
            Err(e) => println!("Failed to process the image: {e}"),
        }
    }
    store.save(&session_id, &state)?;

    report::print_items(state.items());

    // Step 4: assign friends to products
    println!("\nAssign friends to each product (comma-separated names, blank for nobody).");
    let item_names: Vec<String> = state.items().iter().map(|i| i.name.clone()).collect();
    for item in &item_names {
        loop {
            let input = prompt(&mut lines, &format!("Who shares {item}? "))?;
            let participants: Vec<&str> = input
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();

            match state.assign_participants(item, &participants) {
                Ok(()) => {
                    match state.assignment_for(item).map(|a| a.share()) {
                        Some(Ok(share)) => println!("Split price: ${share:.2} each."),
                        _ => println!("{item} left out of the split."),
                    }
                    break;
                }
                Err(e) => println!("{e}"),
            }
        }
    }
    store.save(&session_id, &state)?;

    report::print_assignments(&state);

    // Step 5: settle up
    let payer = state.payer().unwrap_or_default().to_string();
    let settlement = state.compute_settlement()?.clone();
    report::print_settlement(&payer, &settlement);
    store.save(&session_id, &state)?;

    println!("\nSession saved as {session_id}");
    println!("Replay it later with: invoice_split show {session_id}");
    Ok(())
}

/// Print a prompt and read one trimmed line; EOF is an error so the
/// step loops cannot spin on a closed stdin.
fn prompt(
    lines: &mut impl Iterator<Item = io::Result<String>>,
    message: &str,
) -> io::Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    match lines.next() {
        Some(line) => Ok(line?.trim().to_string()),
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stdin closed mid-session",
        )),
    }
}
