// src/oneshot.rs
//
// Non-interactive front-end: drives the same pipeline commands as the
// interactive flow, but from argv in a single pass. Also hosts the
// `sessions` / `show` subcommands over the session store.

use crate::config::Config;
use crate::extract::VisionExtractor;
use crate::pipeline::PipelineState;
use crate::report;
use crate::session_db::SessionStore;
use tracing::info;

#[derive(Debug, PartialEq, Eq)]
pub struct RunArgs {
    pub image: String,
    pub friends: Vec<String>,
    pub payer: String,
    pub assignments: Vec<(String, Vec<String>)>,
    pub db_path: Option<String>,
}

/// Parse `run` arguments:
/// `run <image> --friends a,b,c --payer a [--assign "Item=a,b"]... [--db path]`
pub fn parse_run_args(args: &[String]) -> Result<RunArgs, String> {
    let mut image = None;
    let mut friends = Vec::new();
    let mut payer = None;
    let mut assignments = Vec::new();
    let mut db_path = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--friends" => {
                let value = iter.next().ok_or("--friends needs a value")?;
                friends = split_names(value);
            }
            "--payer" => {
                payer = Some(iter.next().ok_or("--payer needs a value")?.clone());
            }
            "--assign" => {
                let value = iter.next().ok_or("--assign needs a value")?;
                assignments.push(parse_assign_spec(value)?);
            }
            "--db" => {
                db_path = Some(iter.next().ok_or("--db needs a value")?.clone());
            }
            other if !other.starts_with("--") && image.is_none() => {
                image = Some(other.to_string());
            }
            other => return Err(format!("unexpected argument {other:?}")),
        }
    }

    let image = image.ok_or("missing invoice image path")?;
    if friends.is_empty() {
        return Err("missing --friends".to_string());
    }
    let payer = payer.ok_or("missing --payer")?;

    Ok(RunArgs {
        image,
        friends,
        payer,
        assignments,
        db_path,
    })
}

/// One `--assign` value: `Item name=Friend1,Friend2`.
fn parse_assign_spec(spec: &str) -> Result<(String, Vec<String>), String> {
    let (item, names) = spec
        .split_once('=')
        .ok_or_else(|| format!("--assign expects Item=Friend1,Friend2, got {spec:?}"))?;
    let item = item.trim();
    if item.is_empty() {
        return Err(format!("--assign has an empty item name in {spec:?}"));
    }
    Ok((item.to_string(), split_names(names)))
}

fn split_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn run(cfg: &Config, raw_args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_run_args(raw_args)?;
    let db_path = args.db_path.as_deref().unwrap_or(&cfg.db_path);
    let store = SessionStore::new(db_path)?;
    let extractor = VisionExtractor::new(cfg.extraction.clone());

    let mut state = PipelineState::new();
    for friend in &args.friends {
        state.add_participant(friend)?;
    }
    state.set_payer(&args.payer)?;

    let image = std::fs::read(&args.image)?;
    info!(path = %args.image, bytes = image.len(), "Submitting invoice image");
    state.submit_invoice_image(&image, &extractor).await?;

    report::print_items(state.items());

    for (item, participants) in &args.assignments {
        let participants: Vec<&str> = participants.iter().map(String::as_str).collect();
        state.assign_participants(item, &participants)?;
    }
    report::print_assignments(&state);

    let payer = args.payer.clone();
    let settlement = state.compute_settlement()?.clone();
    report::print_settlement(&payer, &settlement);

    let names: Vec<&str> = args.friends.iter().map(String::as_str).collect();
    let session_id = SessionStore::fresh_session_id(&names);
    store.save(&session_id, &state)?;
    println!("\nSession saved as {session_id}");
    Ok(())
}

pub fn list_sessions(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = SessionStore::new(&cfg.db_path)?;
    let sessions = store.list()?;
    if sessions.is_empty() {
        println!("No stored sessions.");
        return Ok(());
    }
    println!("{:<64} {:<24} {}", "Session", "Stage", "Updated");
    for session in sessions {
        println!(
            "{:<64} {:<24} {}",
            session.id, session.stage, session.updated_at
        );
    }
    Ok(())
}

pub fn show_session(cfg: &Config, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = SessionStore::new(&cfg.db_path)?;
    let Some(state) = store.load(id)? else {
        return Err(format!("no session {id:?}").into());
    };

    let names: Vec<&str> = state.roster().names().collect();
    println!("Friends: {}", names.join(", "));
    match state.payer() {
        Some(payer) => println!("Payer: {payer}"),
        None => println!("Payer: (not selected)"),
    }

    if !state.items().is_empty() {
        report::print_items(state.items());
        report::print_assignments(&state);
    }

    match (state.settlement(), state.payer()) {
        (Some(settlement), Some(payer)) => report::print_settlement(payer, settlement),
        _ => println!("\nSession is still {}.", state.stage()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_a_full_run_invocation() {
        let parsed = parse_run_args(&args(&[
            "receipt.jpg",
            "--friends",
            "Alice, Bob,Carol",
            "--payer",
            "Alice",
            "--assign",
            "House Salad=Alice,Bob",
            "--assign",
            "Espresso=Carol",
        ]))
        .unwrap();

        assert_eq!(parsed.image, "receipt.jpg");
        assert_eq!(parsed.friends, ["Alice", "Bob", "Carol"]);
        assert_eq!(parsed.payer, "Alice");
        assert_eq!(parsed.assignments.len(), 2);
        assert_eq!(parsed.assignments[0].0, "House Salad");
        assert_eq!(parsed.assignments[0].1, ["Alice", "Bob"]);
        assert_eq!(parsed.db_path, None);
    }

    #[test]
    fn missing_required_arguments_are_reported() {
        assert!(parse_run_args(&args(&["--friends", "Alice"])).is_err());
        assert!(parse_run_args(&args(&["receipt.jpg", "--payer", "Alice"])).is_err());
        assert!(parse_run_args(&args(&["receipt.jpg", "--friends", "Alice"])).is_err());
    }

    #[test]
    fn assign_spec_requires_an_item_name() {
        assert!(parse_assign_spec("=Alice").is_err());
        assert!(parse_assign_spec("no-equals").is_err());
        let (item, names) = parse_assign_spec("Tea=").unwrap();
        assert_eq!(item, "Tea");
        assert!(names.is_empty());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let err = parse_run_args(&args(&["receipt.jpg", "--fiends", "Alice"])).unwrap_err();
        assert!(err.contains("--fiends"));
    }
}
