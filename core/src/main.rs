use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;

use gridslam::logging::init_logger;
use gridslam::sim::{Obstacle, SimulatedRoom, loop_script, run_simulation};
use gridslam::slam::SlamConfig;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run particle filter occupancy grid SLAM on a simulated room and report the trajectory."
)]
struct Cli {
    /// YAML configuration file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of particles, overrides the configuration
    #[arg(short = 'n', long)]
    particles: Option<usize>,

    /// Number of simulated steps
    #[arg(short, long, default_value_t = 60)]
    steps: usize,

    /// Seed of the random source
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Readings per sensor sweep
    #[arg(short, long, default_value_t = 90)]
    beams: usize,

    /// Write the trajectory to this CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_deref())?;

    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            SlamConfig::load(path)?
        }
        None => SlamConfig::default(),
    };
    if let Some(particles) = cli.particles {
        config.num_particles = particles;
    }
    config.validate()?;

    let room = SimulatedRoom::new(4.0, 4.0).with_obstacle(Obstacle::new(1.2, -1.5, 1.5, -1.0));
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let result = run_simulation(&config, &room, &loop_script(cli.steps), cli.beams, &mut rng)?;

    let errors = result.aligned_position_errors();
    for (record, error) in result.records.iter().zip(&errors) {
        println!(
            "Step {:>4}: neff {:>7.1}{}  estimate {}  drift {:.3} m",
            record.step,
            record.neff,
            if record.resampled { " (resampled)" } else { "" },
            record.estimate(),
            error
        );
    }
    println!(
        "Max drift from first-step frame: {:.3} m, resampled {} of {} steps",
        result.max_aligned_error(),
        result.resample_count(),
        result.records.len()
    );

    if let Some(path) = &cli.output {
        result.to_csv(path)?;
        info!("Trajectory written to {}", path.display());
    }
    Ok(())
}
