use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input};
use tracing_subscriber::EnvFilter;

use budget_assistant::api::ApiServerBuilder;
use budget_assistant::api::jwt::JwksCache;
use budget_assistant::planner::{self, PlanGenerator};
use budget_assistant::voice::{
    AudioCapture, BufferedPlayback, MicRecognizer, Playback, PlaybackOutcome, SpeakerSink,
    SpeechToText, StreamingPlayback, Synthesizer, TextToSpeech, Transcriber, UtteranceLimits,
    rms,
};
use budget_assistant::{Config, Identity, InputTarget, Plan, PlanId, PlanStore, PlannerSession, render, store};

/// Budget Assistant - voice-enabled budget planning
#[derive(Parser)]
#[command(name = "budget", version, about)]
struct Cli {
    /// User whose plans the CLI works with (identity provider users are `idp:<sub>`)
    #[arg(short, long, env = "BUDGET_USER", default_value = budget_assistant::api::LOCAL_USER)]
    user: String,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Port to listen on (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Build a budget plan interactively
    Plan {
        /// Fill fields by speaking instead of typing
        #[arg(long)]
        voice: bool,
        /// Edit an existing plan
        #[arg(long)]
        edit: Option<String>,
        /// Read the generated plan aloud as it streams in
        #[arg(long)]
        stream: bool,
    },
    /// List saved plans, newest first
    List,
    /// Print one plan
    Show { id: String },
    /// Delete a plan
    Delete { id: String },
    /// Read a saved plan aloud
    Speak {
        id: String,
        /// Start playing while audio is still arriving
        #[arg(long)]
        stream: bool,
        /// Provider-specific voice identifier
        #[arg(long)]
        voice: Option<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,budget_assistant=info,budget=info",
        1 => "info,budget_assistant=debug,budget=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load();
    let identity = Identity::new(cli.user.clone()).context("user must not be empty")?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(config, port).await,
        Command::Plan { voice, edit, stream } => plan(&config, identity, voice, edit, stream).await,
        Command::List => list(&config, &identity),
        Command::Show { id } => show(&config, &identity, &id),
        Command::Delete { id } => delete(&config, &identity, &id),
        Command::Speak { id, stream, voice } => speak(&config, &identity, &id, stream, voice).await,
        Command::TestMic { duration } => test_mic(duration).await,
    }
}

fn optional<T>(what: &str, built: budget_assistant::Result<T>) -> Option<T> {
    match built {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "{what} disabled");
            None
        }
    }
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let (store, db) = store::open(&config)?;
    let port = port.unwrap_or(config.server.port);

    tracing::info!(
        port,
        storage = ?config.storage,
        llm = ?config.llm.provider,
        "starting budget assistant"
    );

    let mut builder = ApiServerBuilder::new(store, port)
        .api_token(config.server.api_token.clone())
        .rate_limit(config.server.rate_limit)
        .static_dir(config.server.static_dir.clone());

    if let Some(db) = db {
        builder = builder.db(db);
    }
    if let Some(generator) = optional("plan generation", planner::from_config(&config)) {
        builder = builder.generator(Arc::from(generator));
    }
    if let Some(tts) = optional("text-to-speech", TextToSpeech::from_config(&config)) {
        builder = builder.synthesizer(Arc::new(tts));
    }
    if let Some(stt) = optional("speech-to-text", SpeechToText::from_config(&config)) {
        builder = builder.transcriber(Arc::new(stt));
    }
    if let Some(base_url) = &config.auth_base_url {
        tracing::info!(auth_base_url = %base_url, "accepting identity provider tokens");
        builder = builder.jwt_cache(Arc::new(JwksCache::new(base_url.clone())));
    }

    builder.build().run().await?;
    Ok(())
}

fn playback_for(config: &Config, stream: bool) -> budget_assistant::Result<Arc<dyn Playback>> {
    let tts: Arc<dyn Synthesizer> = Arc::new(TextToSpeech::from_config(config)?);
    let sinks = SpeakerSink::factory();
    Ok(if stream {
        Arc::new(StreamingPlayback::new(tts, sinks))
    } else {
        Arc::new(BufferedPlayback::new(tts, sinks))
    })
}

fn find_plan(store: &dyn PlanStore, identity: &Identity, id: &str) -> anyhow::Result<Plan> {
    store
        .get(Some(identity), &PlanId::from(id))?
        .with_context(|| format!("no plan with id {id}"))
}

async fn plan(
    config: &Config,
    identity: Identity,
    voice: bool,
    edit: Option<String>,
    stream: bool,
) -> anyhow::Result<()> {
    let (store, _db) = store::open(config)?;
    let generator: Arc<dyn PlanGenerator> = Arc::from(planner::from_config(config)?);

    let editing = edit
        .map(|id| find_plan(store.as_ref(), &identity, &id))
        .transpose()?;

    let mut session = PlannerSession::new(Arc::clone(&store), generator, Some(identity));
    if let Some(playback) = optional("read-back", playback_for(config, stream)) {
        session = session.with_playback(playback);
    }
    if voice {
        let stt: Arc<dyn Transcriber> = Arc::new(SpeechToText::from_config(config)?);
        session = session.with_recognizer(Arc::new(MicRecognizer::new(stt)));
        if !session.speech_available() {
            bail!("speech input requested but no microphone is available");
        }
    }

    if let Some(plan) = &editing {
        session.edit(plan);
        println!("Editing \"{}\"\n", plan.name);
    }

    fill_form(&mut session, voice).await?;

    println!("\nGenerating plan...");
    if let Err(e) = session.generate().await {
        bail!("{e}");
    }
    println!("\n{}\n", render::to_plain(session.plan_text()));

    if session.toggle_playback(None).unwrap_or(false) {
        println!("Reading plan aloud (Ctrl-C to stop)...");
        tokio::select! {
            outcome = session.wait_playback() => {
                if let Err(e) = outcome {
                    eprintln!("Read-back failed: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => session.stop_playback(),
        }
    }

    let save = Confirm::new()
        .with_prompt("Save this plan?")
        .default(true)
        .interact()?;
    if save {
        let plan = session.save()?;
        println!("Saved plan {}", plan.id);
    }
    Ok(())
}

async fn fill_form(session: &mut PlannerSession, voice: bool) -> anyhow::Result<()> {
    let name = prompt_text("Plan name", &session.form().name)?;
    session.form_mut().name = name;

    ask(session, voice, InputTarget::Income, "Monthly income").await?;

    let existing: Vec<String> = session.form().expenses.iter().map(|e| e.id.clone()).collect();
    for id in existing {
        if session.form().expense(&id).is_some_and(|e| e.category.is_empty()) {
            session.form_mut().remove_expense(&id);
            continue;
        }
        ask(session, voice, InputTarget::ExpenseCategory(id.clone()), "Expense category").await?;
        ask(session, voice, InputTarget::ExpenseAmount(id), "Amount").await?;
    }

    loop {
        let more = Confirm::new()
            .with_prompt("Add an expense?")
            .default(session.form().expenses.is_empty())
            .interact()?;
        if !more {
            break;
        }
        let id = session.form_mut().add_expense();
        ask(session, voice, InputTarget::ExpenseCategory(id.clone()), "Expense category").await?;
        ask(session, voice, InputTarget::ExpenseAmount(id), "Amount").await?;
    }

    ask(session, voice, InputTarget::Notes, "Notes (optional)").await
}

/// Fill one field by voice, falling back to typing
async fn ask(
    session: &mut PlannerSession,
    voice: bool,
    target: InputTarget,
    label: &str,
) -> anyhow::Result<()> {
    let current = session.form().value(&target).unwrap_or_default();

    if voice {
        println!("{label}: speak now...");
        match session.listen(target.clone()).await {
            Ok(Some(value)) if !value.is_empty() => {
                let accepted = Confirm::new()
                    .with_prompt(format!("{label} = \"{value}\"?"))
                    .default(true)
                    .interact()?;
                if accepted {
                    return Ok(());
                }
            }
            Ok(_) => println!("Didn't catch that."),
            Err(e) => println!("{e}"),
        }
    }

    let value = prompt_text(label, &current)?;
    session.form_mut().set(&target, value)?;
    Ok(())
}

fn prompt_text(label: &str, initial: &str) -> anyhow::Result<String> {
    Ok(Input::<String>::new()
        .with_prompt(label)
        .with_initial_text(initial)
        .allow_empty(true)
        .interact_text()?)
}

fn list(config: &Config, identity: &Identity) -> anyhow::Result<()> {
    let (store, _db) = store::open(config)?;
    let plans = store.list(Some(identity))?;

    if plans.is_empty() {
        println!("No saved plans. Create one with: budget plan");
        return Ok(());
    }

    for plan in plans {
        println!(
            "{}  {}  {:<24}  income {}  ({} expenses)",
            plan.id,
            plan.created_at.format("%Y-%m-%d %H:%M"),
            plan.name,
            plan.income,
            plan.expenses.len()
        );
    }
    Ok(())
}

fn show(config: &Config, identity: &Identity, id: &str) -> anyhow::Result<()> {
    let (store, _db) = store::open(config)?;
    let plan = find_plan(store.as_ref(), identity, id)?;

    println!("{} ({})", plan.name, plan.created_at.format("%Y-%m-%d"));
    println!("Income: {}", plan.income);
    for expense in &plan.expenses {
        println!("  {:<20} {}", expense.category, expense.amount);
    }
    if !plan.notes.trim().is_empty() {
        println!("Notes: {}", plan.notes.trim());
    }
    if let Some(sharing) = &plan.sharing {
        println!(
            "Owner: {} | shared: {} | collaborators: {}",
            sharing.owner_id,
            sharing.is_shared,
            sharing.collaborators.join(", ")
        );
    }
    println!("\n{}", render::to_plain(&plan.plan_text));
    Ok(())
}

fn delete(config: &Config, identity: &Identity, id: &str) -> anyhow::Result<()> {
    let (store, _db) = store::open(config)?;
    store.delete(Some(identity), &PlanId::from(id))?;
    println!("Deleted {id}");
    Ok(())
}

async fn speak(
    config: &Config,
    identity: &Identity,
    id: &str,
    stream: bool,
    voice: Option<String>,
) -> anyhow::Result<()> {
    let (store, _db) = store::open(config)?;
    let plan = find_plan(store.as_ref(), identity, id)?;
    let playback = playback_for(config, stream)?;

    println!("Reading \"{}\" ({} mode, Ctrl-C to stop)...", plan.name, playback.mode());
    let handle = playback.start(plan.plan_text, voice);

    tokio::select! {
        outcome = handle.wait() => {
            if outcome? == PlaybackOutcome::Completed {
                println!("Done.");
            }
        }
        _ = tokio::signal::ctrl_c() => println!("\nStopped."),
    }
    Ok(())
}

/// Test microphone input with a level meter and an utterance recording
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }
    capture.stop();
    drop(capture);

    println!("\nNow say a short phrase; recording stops after a pause.");
    let samples = tokio::task::spawn_blocking(|| {
        AudioCapture::new()?.record_utterance(UtteranceLimits::default(), &AtomicBool::new(false))
    })
    .await??;

    #[allow(clippy::cast_precision_loss)]
    let secs = samples.len() as f32 / budget_assistant::voice::SAMPLE_RATE as f32;
    if samples.is_empty() {
        println!("No speech detected. Check the input device and its level.");
    } else {
        println!("Captured {secs:.1}s of speech. Your mic is working!");
    }
    Ok(())
}
