//! PodcastAI CLI - AI Podcast Generator
//!
//! A command-line tool that turns a topic and a cast of characters into a
//! narrated multi-voice podcast.

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;
use podcastai_core::{
    AgeBand, CancelSignal, Character, Config, ConversationCallback, ConversationEvent, Gender,
    OpenAiProvider, PodcastPipeline, PodcastRequest, VoiceCatalog, latest_artifact,
};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_CONFIG: &str = "podcastai.toml";

#[derive(Parser)]
#[command(
    name = "podcastai",
    version,
    about = "AI Podcast Generator - Let AI characters talk it out",
    long_about = "A CLI tool that generates multi-character podcasts using OpenAI-compatible APIs and local speech synthesizers."
)]
struct Cli {
    /// Configuration file (defaults to ./podcastai.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a podcast about a topic
    Generate {
        /// The topic to talk about
        #[arg(value_name = "TOPIC")]
        topic: String,

        /// A guest as "name:gender:age:style[:personality[:background]]" (2-6 guests)
        #[arg(
            short = 'c',
            long = "character",
            action = ArgAction::Append,
            required = true,
            value_name = "SPEC",
            value_parser = parse_character
        )]
        characters: Vec<Character>,

        /// Number of rounds; every guest speaks once per round
        #[arg(short, long, default_value = "3", value_name = "ROUNDS")]
        rounds: u32,

        /// Model used for every guest
        #[arg(short, long, default_value = "gpt-4o-mini", value_name = "MODEL")]
        model: String,

        /// Requester identity used to name the output file
        #[arg(short, long, default_value = "podcast", value_name = "ID")]
        identity: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the (age band, style) combinations available in the voice catalog
    Voices {
        /// Only show voices of this gender
        #[arg(short, long, value_name = "GENDER")]
        gender: Option<Gender>,
    },

    /// Show the candidate voices for an exact gender, age band and style
    Candidates {
        #[arg(value_name = "GENDER")]
        gender: Gender,
        #[arg(value_name = "AGE")]
        age: AgeBand,
        #[arg(value_name = "STYLE")]
        style: String,
    },

    /// Print the most recent podcast generated for an identity
    Latest {
        #[arg(value_name = "ID")]
        identity: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Generate {
            topic,
            characters,
            rounds,
            model,
            identity,
            json,
        } => run_generate(config, topic, characters, rounds, model, identity, json).await,
        Command::Voices { gender } => {
            print_voices(&load_catalog(&config)?, gender);
            Ok(())
        }
        Command::Candidates { gender, age, style } => {
            let catalog = load_catalog(&config)?;
            let candidates = catalog.candidates(gender, age, &style);
            if candidates.is_empty() {
                eprintln!(
                    "{} no voices for {} / {} / {}",
                    "Error:".red().bold(),
                    gender,
                    age,
                    style
                );
                std::process::exit(1);
            }
            for candidate in candidates {
                println!(
                    "  {}  {}",
                    candidate.id.to_string().bright_cyan().bold(),
                    candidate.description.dimmed()
                );
            }
            Ok(())
        }
        Command::Latest { identity } => {
            match latest_artifact(&config.assembly.output_dir, &identity) {
                Some(path) => println!("{}", path.display()),
                None => {
                    eprintln!(
                        "{} no podcast found for '{}' in {}",
                        "Error:".red().bold(),
                        identity,
                        config.assembly.output_dir.display()
                    );
                    std::process::exit(1);
                }
            }
            Ok(())
        }
    }
}

async fn run_generate(
    config: Config,
    topic: String,
    characters: Vec<Character>,
    rounds: u32,
    model: String,
    identity: String,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Get API configuration from environment
    let api_base = env::var("OPENAI_API_BASE")
        .or_else(|_| env::var("OPENAI_BASE_URL"))
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
        );
        String::new()
    });

    let request = PodcastRequest::new(topic, characters, rounds, model);
    if let Err(e) = request.validate(&config.dialogue) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    let provider = OpenAiProvider::new(api_base, api_key, config.dialogue.request_timeout())?;
    let mut pipeline = PodcastPipeline::from_config(config, Arc::new(provider)).await?;
    if !json {
        pipeline = pipeline.with_callback(create_console_callback());
        print_header(&request);
    }

    let cancel = CancelSignal::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "\nStopping after the current step (Ctrl-C)...".yellow()
            );
            signal.cancel();
        }
    });

    let audio = match pipeline.generate(&request, &identity, &cancel).await {
        Ok(audio) => audio,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&audio)?);
        return Ok(());
    }

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  Podcast ready.".bright_green().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!("  {} {}", "File:".bold(), audio.path.display());
    println!(
        "  {} {:.1}s ({} bytes)",
        "Length:".bold(),
        audio.duration_secs,
        audio.byte_size
    );
    if !audio.skipped_turns.is_empty() {
        let turns: Vec<String> = audio.skipped_turns.iter().map(|t| t.to_string()).collect();
        println!(
            "  {} {}",
            "Skipped turns:".yellow().bold(),
            turns.join(", ").yellow()
        );
    }
    println!();

    Ok(())
}

/// Use the explicit config, else ./podcastai.toml if it exists, else defaults.
fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => Ok(Config::load(DEFAULT_CONFIG)?),
        None => Ok(Config::default()),
    }
}

fn load_catalog(config: &Config) -> Result<VoiceCatalog, Box<dyn std::error::Error>> {
    Ok(match &config.catalog.path {
        Some(path) => VoiceCatalog::load(path)?,
        None => VoiceCatalog::builtin(),
    })
}

fn print_voices(catalog: &VoiceCatalog, gender: Option<Gender>) {
    let combinations = catalog.combinations(gender);
    if combinations.is_empty() {
        println!("{}", "The voice catalog is empty.".yellow());
        return;
    }

    println!(
        "{}",
        format!("  {:<8} {:<8} {:<16} {}", "GENDER", "AGE", "STYLE", "VOICES").bold()
    );
    for combination in combinations {
        println!(
            "  {:<8} {:<8} {:<16} {}",
            combination.gender.to_string(),
            combination.age.to_string(),
            combination.style.bright_cyan(),
            combination.candidates
        );
    }
}

fn print_header(request: &PodcastRequest) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", format!("  {}", "PodcastAI".bold()).bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), request.topic.bright_white());
    println!(
        "{} {} round(s) with {}",
        "Format:".bold(),
        request.rounds,
        request.model.dimmed()
    );
    println!();
    println!("{}", "Guests:".bold());
    for (i, c) in request.characters.iter().enumerate() {
        println!(
            "  {}. {} ({} / {} / {})",
            i + 1,
            c.name.bright_cyan(),
            c.gender,
            c.age,
            c.style.yellow()
        );
    }
    println!();
    println!("{}", "─".repeat(70).dimmed());
}

/// Parse "name:gender:age:style[:personality[:background]]".
fn parse_character(spec: &str) -> Result<Character, String> {
    let parts: Vec<&str> = spec.splitn(6, ':').map(str::trim).collect();
    if parts.len() < 4 {
        return Err(format!(
            "expected name:gender:age:style[:personality[:background]], got '{}'",
            spec
        ));
    }

    let gender: Gender = parts[1].parse()?;
    let age: AgeBand = parts[2].parse()?;
    let mut character = Character::new(parts[0], gender, age, parts[3]);
    if let Some(personality) = parts.get(4).filter(|p| !p.is_empty()) {
        character = character.with_personality(*personality);
    }
    if let Some(background) = parts.get(5).filter(|b| !b.is_empty()) {
        character = character.with_background(*background);
    }
    Ok(character)
}

/// Create a callback that prints conversation events to the console.
fn create_console_callback() -> ConversationCallback {
    Arc::new(move |event: ConversationEvent| match event {
        ConversationEvent::RunStart { turns, .. } => {
            println!("{}", format!("  {} turns to record", turns).dimmed());
            println!();
        }
        ConversationEvent::TurnStart {
            turn,
            round,
            speaker,
        } => {
            println!(
                "{} {} {}",
                "▶".bright_cyan(),
                speaker.bright_cyan().bold(),
                format!("(round {}, turn {})", round, turn).yellow()
            );
        }
        ConversationEvent::Utterance { text, .. } => {
            // Word wrap and indent the content
            let wrapped = textwrap(&text, 66);
            for line in wrapped.lines() {
                println!("  {}", line);
            }
            println!();
        }
        ConversationEvent::Retry {
            attempt,
            delay,
            rate_limited,
            ..
        } => {
            let reason = if rate_limited { "rate limited" } else { "failed" };
            println!(
                "  {}",
                format!(
                    "… {} (attempt {}), retrying in {:.1}s",
                    reason,
                    attempt,
                    delay.as_secs_f64()
                )
                .dimmed()
            );
        }
        ConversationEvent::RunEnd { .. } => {
            println!("{}", "─".repeat(70).dimmed());
            println!("{}", "  Dialogue done, synthesizing voices...".bright_magenta());
        }
    })
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_character_full_spec() {
        let c = parse_character("Ada:female:young:warm:curious:Beekeeper in Lyon").unwrap();
        assert_eq!(c.name, "Ada");
        assert_eq!(c.gender, Gender::Female);
        assert_eq!(c.age, AgeBand::Young);
        assert_eq!(c.style, "warm");
        assert_eq!(c.personality, "curious");
        assert_eq!(c.background, "Beekeeper in Lyon");
    }

    #[test]
    fn test_parse_character_background_may_contain_colons() {
        let c = parse_character("Bo:male:middle-aged:deep::Works 9:00-17:00").unwrap();
        assert_eq!(c.age, AgeBand::Middle);
        assert!(c.personality.is_empty());
        assert_eq!(c.background, "Works 9:00-17:00");
    }

    #[test]
    fn test_parse_character_rejects_short_or_bad_specs() {
        assert!(parse_character("Ada:female:young").is_err());
        assert!(parse_character("Ada:robot:young:warm").is_err());
    }

    #[test]
    fn test_textwrap() {
        let wrapped = textwrap("one two three four five", 9);
        assert_eq!(wrapped, "one two\nthree\nfour five");
    }
}
