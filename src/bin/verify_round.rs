//! Offline crash round verifier
//!
//! Recomputes the commitment and crash point of a finished round from its
//! revealed seed, and optionally checks them against published values.

use clap::Parser;
use crashline::games::fairness;
use crashline::games::types::RoundId;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "verify_round")]
#[command(about = "Verify a crash round from its revealed seed", long_about = None)]
struct Args {
    /// Round number
    #[arg(long)]
    round_id: u64,

    /// Revealed seed (hex)
    #[arg(long)]
    seed: String,

    /// Commitment published before the round (hex SHA-256)
    #[arg(long)]
    expected_hash: Option<String>,

    /// Published crash point, e.g. 1.87
    #[arg(long)]
    expected_crash: Option<f64>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let round_id = RoundId(args.round_id);

    let verification = match fairness::verify(round_id, &args.seed) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::from(2);
        }
    };

    println!("🔍 Crash Round Verification");
    println!("===========================");
    println!("Round:       {}", verification.round_id);
    println!("Seed hash:   {}", verification.seed_hash);
    println!("Crash point: {}x", verification.crash_point.multiplier());

    let mut valid = true;

    if let Some(expected) = args.expected_hash {
        if expected.trim().eq_ignore_ascii_case(&verification.seed_hash) {
            println!("   ✅ Commitment matches");
        } else {
            println!("   ❌ Commitment MISMATCH (published {})", expected.trim());
            valid = false;
        }
    }

    if let Some(expected) = args.expected_crash {
        let published = (expected * 100.0).round() as u64;
        if published == verification.crash_point.hundredths() {
            println!("   ✅ Crash point matches");
        } else {
            println!("   ❌ Crash point MISMATCH (published {:.2}x)", expected);
            valid = false;
        }
    }

    if valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
