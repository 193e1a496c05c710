use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use combo_picker::engine::GenerateRequest;
use combo_picker::persist::{clear_session, default_store_path, load_session, save_session};
use combo_picker::{Combination, PickerConfig, RawMatch, Selection, SessionState, group_matches};

const DEFAULT_MATCHES_PATH: &str = "tests/fixtures/matches.json";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_logging();

    let mut cfg = PickerConfig::from_env();
    if let Some(stake) = parse_f64_arg("--stake") {
        cfg.stake_amount = stake;
    }
    if let Some(cap) = parse_f64_arg("--cap") {
        cfg.payout_cap = cap;
    }
    if let Some(favorites) = parse_usize_arg("--favorites") {
        cfg.target_favorites = Some(favorites);
    }
    if let Some(underdogs) = parse_usize_arg("--underdogs") {
        cfg.target_underdogs = Some(underdogs);
    }
    cfg.validate()?;

    let path = parse_matches_path().unwrap_or_else(|| PathBuf::from(DEFAULT_MATCHES_PATH));
    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let matches: Vec<RawMatch> = serde_json::from_str(&raw).context("parse matches json")?;
    let grouped = group_matches(&matches);
    let units = grouped.ordered_units();
    println!(
        "Matches: {} records -> {} units ({} dropped)",
        matches.len(),
        units.len(),
        grouped.report.dropped()
    );

    if let Some(limit) = parse_usize_arg("--list") {
        let mut engine = cfg.build_engine()?;
        let previous = HashSet::new();
        let request = GenerateRequest {
            max_combinations: limit,
            target_favorites: cfg.target_favorites,
            target_underdogs: cfg.target_underdogs,
            ..GenerateRequest::new(&units, cfg.stake_amount, &previous)
        };
        let generation = engine.generate(&request)?;
        for (idx, combo) in generation.combinations.iter().enumerate() {
            print_combination(idx + 1, combo);
        }
        println!("Status: {:?}", generation.status);
        println!(
            "Stats: {}",
            serde_json::to_string_pretty(&generation.stats).context("serialize stats")?
        );
        return Ok(());
    }

    let store = if has_flag("--no-store") {
        None
    } else {
        parse_path_arg("--store").or_else(default_store_path)
    };
    if has_flag("--reset")
        && let Some(store) = store.as_deref()
    {
        clear_session(store)?;
    }

    let mut session = SessionState::new();
    session.start(matches, cfg.target_favorites, cfg.target_underdogs);
    let saved = match store.as_deref() {
        Some(path) => load_session(path).context("saved session is unusable, rerun with --reset")?,
        None => None,
    };
    if let Some(saved) = saved
        && saved.original_matches == session.original_matches
    {
        println!("Restored {} used combinations", saved.used_keys.len());
        session.restore_keys(saved.used_keys);
    }

    let mut selector = cfg.build_selector()?;
    let picks = parse_usize_arg("--picks").unwrap_or(1);
    for idx in 0..picks {
        match selector.pick_next(&units, cfg.stake_amount, &mut session, None, None)? {
            Selection::Picked(combo) => print_combination(idx + 1, &combo),
            Selection::Exhausted(reason) => {
                println!("Exhausted: {reason}");
                break;
            }
        }
    }

    if let Some(store) = store.as_deref() {
        save_session(store, &session)?;
        println!("Session saved to {}", store.display());
    }
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_combination(n: usize, combo: &Combination) {
    println!(
        "#{n} fav={} dog={} return={:.2}",
        combo.favorite_count, combo.underdog_count, combo.potential_return
    );
    for pick in &combo.players {
        println!(
            "   {:<12} {} {} @ {:.2}",
            pick.match_id, pick.side, pick.participant_name, pick.odds_decimal
        );
    }
}

fn parse_matches_path() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut skip_next = false;
    for arg in &args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with("--") {
            // Flags that take a separate value.
            skip_next = !arg.contains('=') && !matches!(arg.as_str(), "--reset" | "--no-store");
            continue;
        }
        if !arg.trim().is_empty() {
            return Some(PathBuf::from(arg));
        }
    }
    None
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}

fn parse_f64_arg(name: &str) -> Option<f64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<f64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<f64>()
        {
            return Some(v);
        }
    }
    None
}

fn parse_usize_arg(name: &str) -> Option<usize> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<usize>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<usize>()
        {
            return Some(v);
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
