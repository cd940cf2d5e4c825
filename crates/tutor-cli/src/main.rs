mod learn;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tutor_api::{AppState, Providers};
use tutor_core::TutorConfig;

#[derive(Parser)]
#[command(name = "tutor", about = "Adaptive tutoring backend operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Select the next question(s) for a learner
    Select {
        learner: String,
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Record a question attempt
    Attempt {
        learner: String,
        question: String,
        #[arg(long)]
        correct: bool,
        #[arg(long, default_value_t = 30.0)]
        time: f64,
    },
    /// Start an assessment for a learner grade
    Assess {
        learner: String,
        #[arg(long, default_value_t = 3)]
        grade: i32,
        #[arg(long, default_value = "math")]
        subject: String,
    },
    /// Show per-skill progress for a learner
    Progress { learner: String },
    /// Run an interactive conversational session from stdin
    Session { learner: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tutor_api::init_tracing();

    let cli = Cli::parse();
    let config = TutorConfig::from_env();
    let providers = Providers::from_config(&config);
    let app = AppState::build(config, providers).await?;

    match cli.command {
        Command::Select { learner, count } => learn::select(&app, &learner, count).await,
        Command::Attempt {
            learner,
            question,
            correct,
            time,
        } => learn::attempt(&app, &learner, &question, correct, time).await,
        Command::Assess {
            learner,
            grade,
            subject,
        } => learn::assess(&app, &learner, grade, &subject).await,
        Command::Progress { learner } => learn::progress(&app, &learner).await,
        Command::Session { learner } => session::run(&app, &learner).await,
    }
}
