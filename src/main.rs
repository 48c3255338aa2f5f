use std::fs::File;
use std::io::{stdout, BufWriter, Write};
use std::path::PathBuf;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use dukemap::config::JobConfig;
use dukemap::driver::{PipelineDriver, RemapJob};
use dukemap::variant::VariantProfile;

#[derive(Debug, Parser)]
struct Cli {
	/// Be verbose.
	#[arg(short = 'v', long = "verbose", global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Remaps the archives of a job file along the namespace chain of its toolchain
	Remap {
		/// The job file, in json
		#[arg(long = "config")]
		config: PathBuf,
		/// Rebuild all outputs, even if they exist
		#[arg(long = "force")]
		force: bool,
		/// The input archives changed, rebuild all outputs
		#[arg(long = "upstream-changed")]
		upstream_changed: bool,
	},
	/// Converts an access widener into an access transformer
	Aw2at {
		file: PathBuf,
		/// Where to write the access transformer, defaults to stdout
		#[arg(short = 'o', long = "output")]
		output: Option<PathBuf>,
	},
}

fn setup_logger(verbose: bool) -> Result<()> {
	fern::Dispatch::new()
		.format(|out, message, record| {
			out.finish(format_args!("[{} {}] {}", record.level(), record.target(), message))
		})
		.level(if verbose { LevelFilter::Debug } else { LevelFilter::Info })
		.chain(std::io::stderr())
		.apply()
		.context("failed to set up logging")
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	setup_logger(cli.verbose)?;

	match cli.command {
		Command::Remap { config, force, upstream_changed } => {
			let config = JobConfig::read_file(&config)?;
			let profile = VariantProfile::new(config.toolchain);
			let job = RemapJob::from_config(config, force, upstream_changed);

			let report = PipelineDriver::new(job, profile).run()?;
			info!("done, remapped {} hops", report.hops);
			for ((role, namespace), path) in &report.outputs {
				info!("{role} ({namespace}): {path:?}");
			}
		},
		Command::Aw2at { file, output } => {
			let transforms = dukemap::access_widener_to_transforms(&file)?;
			match output {
				Some(output) => {
					let file = File::create(&output)
						.with_context(|| anyhow!("failed to create {output:?}"))?;
					let mut writer = BufWriter::new(file);
					transforms.write(&mut writer)?;
					writer.flush()?;
				},
				None => transforms.write(&mut stdout().lock())?,
			}
		},
	}

	Ok(())
}
