use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use self::{
    classify::ClassifyArg, combine::CombineArg, final_coefs::FinalCoefsArg,
    save_subjects::SaveSubjectsArg, step_forward::StepForwardArg,
};

mod classify;
mod combine;
mod final_coefs;
mod save_subjects;
mod step_forward;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Logging verbosity: trace, debug, info, warn or error
    #[arg(long, global = true, default_value = "info")]
    log_level: Level,
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Concatenate per-subject CSV exports of one raw table
    Combine(#[clap(flatten)] CombineArg),
    /// Build and save subject views for the standard inclusion policies
    SaveSubjects(#[clap(flatten)] SaveSubjectsArg),
    /// Classify memory outcome per subject over many seeds
    Classify(#[clap(flatten)] ClassifyArg),
    /// Greedy forward predictor selection with cached cells
    StepForward(#[clap(flatten)] StepForwardArg),
    /// Per-subject regularization, modal regularization and final coefficients
    FinalCoefs(#[clap(flatten)] FinalCoefsArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.mode {
        Mode::Combine(arg) => combine::run(&arg)?,
        Mode::SaveSubjects(arg) => save_subjects::run(&arg)?,
        Mode::Classify(arg) => classify::run(&arg)?,
        Mode::StepForward(arg) => step_forward::run(&arg)?,
        Mode::FinalCoefs(arg) => final_coefs::run(&arg)?,
    }
    Ok(())
}
