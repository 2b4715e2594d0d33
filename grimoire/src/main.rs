//! Grimoire parser.
//!
//! Reads photographs of a Blood on the Clocktower grimoire and reports who
//! sits where with which role, as JSON or as a Town Square game state.

mod config;
mod util {
	pub mod assets;
}

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use config::Config;
use ie::pipeline::townsquare::to_game_state;
use ie::{DirStore, FileLoader, Ie, NameExtractor, NoOcr, ParseError, ReferenceIndex, ReferenceMatcher, TextRecognizer, TokenStore};

#[derive(Parser)]
#[command(name = "grimoire")]
#[command(about = "Extract player names and roles from grimoire photographs")]
#[command(version)]
struct Cli {
	#[command(flatten)]
	paths: PathArgs,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Clone, Args)]
struct PathArgs {
	/// Config file (default: grimoire.json in the platform config directory).
	#[arg(long, global = true)]
	config: Option<PathBuf>,

	/// Directory with the grimoire photographs.
	#[arg(long, global = true)]
	input: Option<PathBuf>,

	/// Directory for token crops.
	#[arg(long, global = true)]
	output: Option<PathBuf>,

	/// Directory with the reference role icons.
	#[arg(long, global = true)]
	references: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
	/// Detect tokens, read player names and store token crops.
	Extract,

	/// Identify previously stored token crops.
	Match {
		/// Also list the best N references for every seat.
		#[arg(long)]
		rank: Option<usize>,
	},

	/// Extract and match in one go.
	Parse {
		/// Print a Town Square game state instead of the seat list.
		#[arg(long)]
		town_square: bool,
	},

	/// Show the effective configuration.
	Config {
		/// Write the effective configuration to the config file.
		#[arg(long)]
		save: bool,
	},
}

#[derive(Serialize)]
struct ExtractOutput {
	image_count: usize,
	total_tokens: u32,
	tokens: Vec<NamedToken>,
	steps: Vec<String>,
}

#[derive(Serialize)]
struct NamedToken {
	seat: u32,
	player_name: Option<String>,
}

#[derive(Serialize)]
struct RankedMatch {
	#[serde(flatten)]
	result: ie::MatchResult,
	#[serde(skip_serializing_if = "Option::is_none")]
	candidates: Option<Vec<ie::Candidate>>,
}

fn main() -> ExitCode {
	// Structured logging. Use `RUST_LOG=info` etc.
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();
	match run(cli) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			if let Some(ParseError::NoImages { .. }) = err.downcast_ref::<ParseError>() {
				eprintln!("{err}");
				return ExitCode::from(2);
			}
			eprintln!("error: {err:#}");
			ExitCode::FAILURE
		}
	}
}

fn run(cli: Cli) -> Result<()> {
	let config_path = match &cli.paths.config {
		Some(path) => path.clone(),
		None => Config::default_path()?,
	};
	let mut config = Config::load_or_default(&config_path);
	apply_overrides(&mut config, &cli.paths);

	match cli.command {
		Commands::Extract => {
			let names = NameExtractor::new(recognizer(&config.ocr_lang));
			let mut store = DirStore::new(&config.output_dir);
			let extraction = ie::extract_tokens(&config.input_dir, &FileLoader, &names, &mut store, &config.ie)?;

			print_json(&ExtractOutput {
				image_count: extraction.image_count,
				total_tokens: extraction.total_tokens,
				tokens: extraction
					.names
					.into_iter()
					.map(|(seat, player_name)| NamedToken { seat, player_name })
					.collect(),
				steps: extraction.steps,
			})
		}
		Commands::Match { rank } => {
			let matcher = ReferenceMatcher::new(ReferenceIndex::from_dir(&config.reference_dir)?);
			let store = DirStore::new(&config.output_dir);
			let matches = ie::match_tokens(&store, &matcher)?;

			let mut out = Vec::with_capacity(matches.len());
			for (seat, result) in matches {
				let candidates = match rank {
					Some(n) => Some(
						store
							.load(seat)
							.and_then(|crop| matcher.rank(crop.as_image(), n))
							.with_context(|| format!("rank seat {seat}"))?,
					),
					None => None,
				};
				out.push(RankedMatch { result, candidates });
			}
			print_json(&out)
		}
		Commands::Parse { town_square } => {
			let matcher = ReferenceMatcher::new(ReferenceIndex::from_dir(&config.reference_dir)?);
			let ie = Ie::new(config.ie, recognizer(&config.ocr_lang), matcher);
			let mut store = DirStore::new(&config.output_dir);
			let parsed = ie.parse(&config.input_dir, &mut store)?;

			if town_square {
				println!("{}", to_game_state(&parsed.seats).to_json_pretty()?);
				Ok(())
			} else {
				print_json(&parsed)
			}
		}
		Commands::Config { save } => {
			if save {
				config.save(&config_path)?;
				tracing::info!(path = %config_path.display(), "config saved");
			}
			println!("{}", config_path.display());
			print_json(&config)
		}
	}
}

fn apply_overrides(config: &mut Config, paths: &PathArgs) {
	if let Some(dir) = &paths.input {
		config.input_dir = dir.clone();
	}
	if let Some(dir) = &paths.output {
		config.output_dir = dir.clone();
	}
	if let Some(dir) = &paths.references {
		config.reference_dir = dir.clone();
	}
}

/// PaddleOCR when its models can be found, otherwise a recognizer that reads nothing.
fn recognizer(lang_code: &str) -> Box<dyn TextRecognizer> {
	#[cfg(feature = "paddle")]
	{
		let paddle = util::assets::resolve_ocr_assets(lang_code)
			.and_then(|assets| ie::ocr::PaddleOcr::try_new(&assets.detection, &assets.recognition, &assets.charset));
		match paddle {
			Ok(ocr) => return Box::new(ocr),
			Err(err) => tracing::warn!("OCR unavailable, player names will be empty: {err:#}"),
		}
	}
	#[cfg(not(feature = "paddle"))]
	tracing::warn!(lang = lang_code, "built without OCR, player names will be empty");

	Box::new(NoOcr)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value).context("serialize output")?);
	Ok(())
}
