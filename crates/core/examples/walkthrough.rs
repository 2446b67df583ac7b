//! Drives a short tutoring session against the scripted generator and prints
//! each presented payload. Run with `cargo run --example walkthrough`.

use mentor_core::content::ScriptedGenerator;
use mentor_core::{Curriculum, Orchestrator, Rules};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let curriculum = Arc::new(Curriculum::from_json(
        r#"[{
            "id": "arithmetic",
            "title": "Arithmetic",
            "description": "Foundations of number work",
            "topics": [
                {"id": "addition", "title": "Addition", "description": "Combining numbers"},
                {"id": "subtraction", "title": "Subtraction", "prerequisites": ["addition"]}
            ]
        }]"#,
    )?);

    let generator = Arc::new(ScriptedGenerator::with_replies([
        "Addition means combining two groups into one bigger group.",
        "You have 3 rockets and find 4 more. How many rockets?\nSOLUTION: 3 + 4 = 7. The answer is 7.",
        "CORRECT: Exactly, 7 rockets!",
        "A space station docks 5 pods, then 9 more. How many pods?\nSOLUTION: The answer is 14.",
    ]));

    let orchestrator = Orchestrator::new(curriculum, generator, Rules::default());

    let created = orchestrator
        .create_session("addition", "space travel", None, None)
        .await?;
    println!("[{}] {}", created.initial_payload.action, created.initial_payload.text);

    let practice = orchestrator.process_step(created.session_id).await?;
    println!("[{}] {}", practice.action, practice.text);

    for payload in orchestrator
        .handle_user_input(created.session_id, "7")
        .await?
    {
        println!("[{}] {}", payload.action, payload.text);
    }

    let metadata = orchestrator.get_metadata(created.session_id).await?;
    println!(
        "topic={} phase={} mastery={:.2} streak={}",
        metadata.topic, metadata.phase, metadata.mastery, metadata.consecutive_correct
    );
    Ok(())
}
