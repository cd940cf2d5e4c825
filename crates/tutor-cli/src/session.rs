//! Interactive session demo: stdin lines become user transcript events, and
//! queued instructions (greeting, injections, closing) print as they arrive.

use anyhow::Result;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tutor_api::AppState;
use tutor_core::{SessionEvent, Speaker};

pub async fn run(app: &AppState, learner: &str) -> Result<()> {
    let pipeline_task = app.spawn_pipeline();

    let (session, greeting) = app.assistant.start_session(learner).await?;
    // Consume the queued greeting so the stream below starts clean.
    app.assistant.injections().pop(&session.id);
    println!("--- session {} ---", session.id);
    println!("{greeting}\n");
    println!("Type the student's lines; 'quit' ends the session.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim().to_string();
        if text.is_empty() {
            continue;
        }
        if text == "quit" {
            break;
        }

        app.pipeline.enqueue(SessionEvent::text(
            session.id.clone(),
            learner,
            Speaker::User,
            text,
            Utc::now(),
        ));

        // Give retrieval/synthesis a moment, then drain any instructions.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        while let Some(instruction) = app.assistant.injections().pop(&session.id) {
            println!(">>> {}", instruction.text);
        }
    }

    let closing = app.assistant.end_session(&session.id).await?;
    println!("\n{closing}");

    app.pipeline.shutdown();
    pipeline_task.abort();
    Ok(())
}
