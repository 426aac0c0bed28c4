// memodeck - main.rs
// Thin CLI over the engine: show deck summaries or train model parameters.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use memodeck::{Config, Engine};

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage: {} <path/to/collection.db> [summary|train]",
            args.first().map(String::as_str).unwrap_or("memodeck")
        );
        return ExitCode::FAILURE;
    }

    let mut config = Config::new(PathBuf::from(&args[1]));
    config.params_path = Some(PathBuf::from(format!("{}.params.json", args[1])));
    let command = args.get(2).map(String::as_str).unwrap_or("summary");

    let engine = match Engine::open(&config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to open collection: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match command {
        "summary" => summary(&engine),
        "train" => train(&engine),
        other => {
            eprintln!("Unknown command: {other}");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn summary(engine: &Engine) -> memodeck::Result<()> {
    for deck in engine.decks_display()? {
        println!(
            "{:<30} to learn: {:>4}  learning: {:>4}  to review: {:>4}",
            deck.deck_name, deck.to_learn, deck.learning, deck.to_review
        );
    }
    println!("Cards studied today: {}", engine.card_count_learned_today()?);
    Ok(())
}

fn train(engine: &Engine) -> memodeck::Result<()> {
    println!("Fitting model parameters against the review log...");
    let weights = engine.train_fsrs_model(None)?;
    let formatted: Vec<String> = weights.iter().map(|w| format!("{w:.4}")).collect();
    println!("Fitted weights: [{}]", formatted.join(", "));
    Ok(())
}
