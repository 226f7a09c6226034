use clap::Parser;
use copy_rnn::{
    CopyTask, ExperimentConfig, SequenceModel, Trainer, TrainingMethod, TrainingReport,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Train a recurrent network on the copying task and compare it to the no-learning baseline.
#[derive(Parser, Debug)]
#[command(name = "copying-task")]
struct Args {
    /// JSON experiment configuration. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    len_wait: Option<usize>,

    #[arg(long)]
    len_sequence: Option<usize>,

    #[arg(long)]
    num_symbols: Option<usize>,

    #[arg(long)]
    iterations: Option<usize>,

    /// adamw or cosyne
    #[arg(long)]
    method: Option<TrainingMethod>,

    #[arg(long)]
    seed: Option<u64>,

    /// Write the training report here as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn build_config(args: &Args) -> copy_rnn::Result<ExperimentConfig> {
    let mut config = match args.config {
        Some(ref path) => ExperimentConfig::from_json_file(path)?,
        None => ExperimentConfig::default(),
    };

    let task = config.task;
    config.task = CopyTask::new(
        args.len_wait.unwrap_or(task.len_wait()),
        args.len_sequence.unwrap_or(task.len_sequence()),
        args.num_symbols.unwrap_or(task.num_symbols()),
    )?;
    if let Some(iterations) = args.iterations {
        config.training.iterations = iterations;
    }
    if let Some(method) = args.method {
        config.training.method = method;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn demonstrate(trainer: &Trainer, seed: u64) -> copy_rnn::Result<()> {
    let task = trainer.config().task;
    let mut rng = StdRng::seed_from_u64(seed);
    let batch = task.generate(3, &mut rng)?;
    let payload_from = task.len_wait() + task.len_sequence();
    for (input, target) in batch.samples() {
        let predicted = trainer.model().predict(input)?;
        println!(
            "payload={:?} predicted={:?}",
            &target[payload_from..],
            &predicted[payload_from..]
        );
    }
    Ok(())
}

fn summarize(report: &TrainingReport) {
    println!("---");
    println!(
        "task: len_wait={} len_sequence={} num_symbols={} (total length {})",
        report.task.len_wait(),
        report.task.len_sequence(),
        report.task.num_symbols(),
        report.task.total_length()
    );
    println!(
        "baseline loss={:.5} memoryless accuracy={:.4}",
        report.baseline_loss, report.memoryless_accuracy
    );
    if let Some(last) = report.final_record() {
        println!(
            "final loss={:.5} accuracy={:.4} iterations={}{}",
            last.eval_loss,
            last.eval_accuracy,
            report.iterations_run,
            if report.stopped_early {
                " (stopped early)"
            } else {
                ""
            }
        );
    }
    if report.beats_baseline() {
        println!("model beats the baseline");
    } else {
        println!("model does not beat the baseline");
    }
}

fn run(args: Args) -> copy_rnn::Result<()> {
    let config = build_config(&args)?;
    let seed = config.training.seed;
    let mut trainer = Trainer::new(config)?;
    println!("baseline loss: {:.5}", trainer.baseline_loss());

    let report = trainer.train()?;
    summarize(&report);
    demonstrate(&trainer, seed.wrapping_add(1))?;

    if let Some(path) = args.report {
        report.write_json(&path)?;
        println!("report written to {}", path.display());
    }
    Ok(())
}

pub fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
