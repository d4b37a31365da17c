// src/main.rs

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use exam_coach_lib::exposure::record_exposure;
use exam_coach_lib::{
    generate_assessment, record_attempt, recommend_next_topic, skip_recommendation, AttemptHistory,
    AttemptRecord, EngineConfig, QuestionBank, SkipCounterStore, SqliteStore, TopicCatalog,
};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "exam-coach", about = "Adaptive mock exams and study recommendations")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file
    #[arg(long, global = true, default_value = "exam_coach.db")]
    db: PathBuf,

    /// Engine configuration (JSON); defaults apply to missing keys
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Topic catalog (JSON); the built-in driving theory catalog otherwise
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and seed a question bank
    Init {
        /// JSON array of questions
        bank: PathBuf,
    },
    /// Suggest the next topic to study
    Recommend {
        #[arg(long)]
        learner: String,
    },
    /// Assemble a personalised mock exam
    Assess {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        exam: String,
        /// Fixed random seed for reproducible selection
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Record that the learner took an exam's questions
    Commit {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        exam: String,
        /// Comma-separated question ids
        #[arg(long, value_delimiter = ',', required = true)]
        questions: Vec<String>,
    },
    /// Record a finished quiz or exam
    Attempt {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        topic: String,
        #[arg(long)]
        score: u8,
        #[arg(long)]
        total: u32,
        #[arg(long)]
        correct: u32,
    },
    /// Record that the learner skipped a recommendation
    Skip {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        topic: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let catalog = match &cli.catalog {
        Some(path) => TopicCatalog::load(path)
            .with_context(|| format!("failed to load catalog {}", path.display()))?,
        None => TopicCatalog::driving_theory(),
    };

    debug!("Database path: {:?}", cli.db);
    let store = SqliteStore::open(&cli.db)
        .with_context(|| format!("failed to open database {}", cli.db.display()))?;

    match cli.command {
        Commands::Init { bank } => {
            let json = fs::read_to_string(&bank)
                .with_context(|| format!("failed to read question bank {}", bank.display()))?;
            let count = store.seed_questions(&json)?;
            info!("Seeded {} questions into {:?}", count, cli.db);
        }
        Commands::Recommend { learner } => {
            let attempts = store.attempts_for(&learner)?;
            let skips = store.skip_counts(&learner)?;
            let recommendation = recommend_next_topic(&catalog, &config, &learner, &attempts, &skips)?;
            println!("{}", serde_json::to_string_pretty(&recommendation)?);
        }
        Commands::Assess { learner, exam, seed } => {
            let bank = QuestionBank::new(store.questions()?, catalog);
            let attempts = store.attempts_for(&learner)?;
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let result = generate_assessment(
                &bank,
                &config,
                &learner,
                &attempts,
                &exam,
                &store,
                Utc::now(),
                &mut rng,
            )?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Commit {
            learner,
            exam,
            questions,
        } => {
            let records = record_exposure(&store, &learner, &questions, &exam, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Attempt {
            learner,
            topic,
            score,
            total,
            correct,
        } => {
            let attempt = AttemptRecord {
                topic_id: topic,
                score,
                total_questions: total,
                correct_count: correct,
                timestamp: Utc::now(),
            };
            record_attempt(&store, &store, &learner, &attempt).context("attempt rejected")?;
        }
        Commands::Skip { learner, topic } => {
            let count = skip_recommendation(&store, &learner, &topic)?;
            println!("{} skipped {} times", topic, count);
        }
    }

    Ok(())
}
