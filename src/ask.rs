//! One-shot question from the command line (`philo ask`).

use anyhow::Result;

use philosophy_rag_core::models::{Response, ResponseMode};

use crate::app;
use crate::config::Config;

pub async fn run_ask(
    config: &Config,
    question: &str,
    school: &str,
    mode: ResponseMode,
    json: bool,
) -> Result<()> {
    let app = app::bootstrap(config.clone()).await?;
    let outcome = app.engine.respond(question, school, mode).await;
    app.store.close().await;

    let response = match outcome {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(stage = %e.stage, code = e.code(), error = %e.source, "turn failed");
            eprintln!("{}", e.user_message());
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

fn print_response(response: &Response) {
    println!("{}", response.text);
    if response.refused {
        return;
    }
    println!();
    println!(
        "  confidence: {:.3}   socratic: {}",
        response.confidence,
        if response.socratic { "yes" } else { "no" }
    );
    if !response.citations.is_empty() {
        println!("  sources:");
        for c in &response.citations {
            println!("    {} [{}..{}] score {:.3}", c.source, c.start, c.end, c.score);
        }
    }
}
