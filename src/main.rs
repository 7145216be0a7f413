use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use polars::prelude::DataFrame;

use plant_dash::export;
use plant_dash::pipeline::run_recovery_sweep;
use plant_dash::recovery::round2;
use plant_dash::{BatchReport, DashConfig, DashError, DowntimeFilter, Session, UploadedFile};

#[derive(Parser)]
#[command(name = "plant-dash")]
#[command(about = "Plant operations reports from daily workbook exports")]
struct Args {
    /// JSON config file; defaults apply to absent fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write CSV here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Day-wise WIP per Resources × Inv from FNDWRR summaries
    Wip {
        files: Vec<PathBuf>,
        /// First day kept in the output, YYYY-MM-DD
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day kept in the output, YYYY-MM-DD
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Best width and angle for one or more disc diameters
    Recovery {
        /// Disc diameters, mm (comma separated)
        #[arg(short, long, required = true, value_delimiter = ',')]
        diameter: Vec<f64>,
        /// Gap between discs, mm (default from config)
        #[arg(long)]
        disc_to_disc: Option<f64>,
        /// Margin to the coil edge, mm (default from config)
        #[arg(long)]
        disc_to_border: Option<f64>,
        /// Emit the full trial grid instead of the per-width best
        #[arg(long)]
        all: bool,
    },
    /// Press delay and NRT rollup from the daily delay workbook
    Downtime {
        file: PathBuf,
        /// Only these presses (comma separated)
        #[arg(long, value_delimiter = ',')]
        presses: Vec<u32>,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Pending-to-pack items older than the threshold
    Aging {
        files: Vec<PathBuf>,
        /// Days; overrides the configured threshold
        #[arg(short, long)]
        threshold: Option<f64>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), DashError> {
    let config = match &args.config {
        Some(path) => DashConfig::load(path)?,
        None => DashConfig::default(),
    };
    let mut session = Session::new(config);

    let mut frame = match args.command {
        Command::Wip { files, from, to } => {
            let report = session.wip_trend(&read_uploads(&files)?)?;
            let mut matrix = unwrap_report(report)?;
            if from.is_some() || to.is_some() {
                matrix = matrix.slice_dates(
                    from.unwrap_or(NaiveDate::MIN),
                    to.unwrap_or(NaiveDate::MAX),
                );
            }
            info!(
                "{} series over {} day(s)",
                matrix.height(),
                matrix.width()
            );
            matrix.to_dataframe()?
        }
        Command::Recovery {
            diameter,
            disc_to_disc,
            disc_to_border,
            all,
        } => {
            let settings = &session.config().recovery;
            let reports = run_recovery_sweep(
                &diameter,
                disc_to_disc.unwrap_or(settings.params.disc_to_disc),
                disc_to_border.unwrap_or(settings.params.disc_to_border),
                settings,
            )?;
            let mut out: Option<DataFrame> = None;
            for report in &reports {
                match report.global_best.filter(|t| t.is_feasible()) {
                    Some(best) => info!(
                        "Diameter {} mm: width {} mm at {}°, recovery {}%",
                        report.diameter,
                        best.width,
                        best.angle,
                        round2(best.recovery)
                    ),
                    None => warn!("No feasible width for diameter {} mm", report.diameter),
                }
                let frame = if all {
                    report.trials_frame()?
                } else {
                    report.best_per_width_frame()?
                };
                match out.as_mut() {
                    Some(acc) => {
                        acc.vstack_mut(&frame)?;
                    }
                    None => out = Some(frame),
                }
            }
            out.ok_or_else(|| DashError::NoData("no diameters given".into()))?
        }
        Command::Downtime {
            file,
            presses,
            from,
            to,
        } => {
            let upload = read_upload(&file)?;
            let table = unwrap_report(session.downtime(&upload)?)?;
            let view = table.filter(&DowntimeFilter { presses, from, to });
            if let Some(e) = view.delay_extremes() {
                info!(
                    "Least delay: press {} ({} h), most delay: press {} ({} h)",
                    e.min_entity, e.min_value, e.max_entity, e.max_value
                );
            }
            let threshold = session.config().delay_share_threshold_pct;
            for press in view.presses() {
                if let Some(m) = view.press_metrics(press) {
                    info!(
                        "Press {press}: {} day(s), avg NRT {} h, todate NRT {} h, todate delay {} h, engineering {} h ({}%)",
                        m.days,
                        round2(m.average_nrt),
                        round2(m.todate_nrt),
                        round2(m.todate_delay),
                        round2(m.engineering_downtime),
                        round2(m.engineering_pct)
                    );
                }
                for share in view.delay_breakdown(press, threshold) {
                    info!(
                        "Press {press}: {} {} h ({}%)",
                        share.category,
                        round2(share.hours),
                        round2(share.share_pct)
                    );
                }
            }
            view.to_dataframe()?
        }
        Command::Aging { files, threshold } => {
            let report = session.aging(&read_uploads(&files)?, threshold)?;
            let df = unwrap_report(report)?;
            info!("{} overdue item(s)", df.height());
            df
        }
    };

    write_frame(&mut frame, args.output.as_deref())
}

fn read_upload(path: &Path) -> Result<UploadedFile, DashError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(UploadedFile::new(name, fs::read(path)?))
}

fn read_uploads(paths: &[PathBuf]) -> Result<Vec<UploadedFile>, DashError> {
    paths.iter().map(|p| read_upload(p)).collect()
}

fn unwrap_report<T>(report: BatchReport<T>) -> Result<T, DashError> {
    for d in &report.diagnostics {
        warn!("{d}");
    }
    report
        .output
        .ok_or_else(|| DashError::NoData("nothing to report".into()))
}

fn write_frame(df: &mut DataFrame, output: Option<&Path>) -> Result<(), DashError> {
    match output {
        Some(path) => {
            export::write_csv(df, path)?;
            info!("Wrote {} row(s) to {}", df.height(), path.display());
        }
        None => {
            let bytes = export::to_csv_bytes(df)?;
            io::stdout().write_all(&bytes)?;
        }
    }
    Ok(())
}
