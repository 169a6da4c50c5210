use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use gemimg_contracts::events::{new_run_id, EventWriter};
use gemimg_contracts::request::{
    AspectRatio, GenerationRequest, ImageSize, MultipleImagePolicy, DEFAULT_MODEL,
    MAX_REFERENCE_IMAGES,
};
use gemimg_engine::credentials::missing_key_help;
use gemimg_engine::{GeminiClient, ImageEngine, KeyResolver};

const BANNER_WIDTH: usize = 50;
const PROMPT_BANNER_CHARS: usize = 80;

const AFTER_HELP: &str = "\
Examples:
    # Simple image generation
    gemimg -p \"A blue circle on white background\" -o output.png

    # Logo with specific aspect ratio and high resolution
    gemimg --prompt \"Modern minimalist logo for tech company 'KW Labs'\" \\
        --output logo.png --aspect-ratio 1:1 --size 2K

    # Image with reference for style
    gemimg --prompt \"Similar style logo but for a coffee shop\" \\
        --output coffee-logo.png --reference existing-logo.png

Environment:
    GEMINI_API_KEY    Required. Get from https://aistudio.google.com/
                      Can be set in .env.local, .env, or as environment variable
    GEMINI_API_BASE   Optional API base URL override";

#[derive(Debug, Parser)]
#[command(
    name = "gemimg",
    version,
    about = "Generate images using Google's Gemini API",
    after_help = AFTER_HELP
)]
struct Cli {
    /// Image generation prompt (detailed description works best)
    #[arg(short, long)]
    prompt: String,
    /// Output file path
    #[arg(short, long)]
    output: PathBuf,
    /// Aspect ratio: 1:1, 2:3, 3:2, 3:4, 4:3, 4:5, 5:4, 9:16, 16:9, 21:9
    #[arg(long, default_value = "1:1")]
    aspect_ratio: AspectRatio,
    /// Image resolution: 1K, 2K, or 4K
    #[arg(long, default_value = "1K")]
    size: String,
    /// Gemini model, e.g. gemini-3-pro-image-preview (Pro) or gemini-2.5-flash-image (Flash)
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
    /// Path to an env file containing GEMINI_API_KEY
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Reference image for style/content guidance (repeatable, max 14)
    #[arg(long = "reference")]
    references: Vec<PathBuf>,
    /// Enable Google Search grounding
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    grounding: bool,
    /// What to do when the response holds more than one image: first or error
    #[arg(long, default_value = "first")]
    on_multiple_images: MultipleImagePolicy,
    /// Append run events as JSONL to this file
    #[arg(long)]
    events: Option<PathBuf>,
    /// Write a JSON receipt of the run to this file
    #[arg(long)]
    receipt: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("gemimg error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let size: ImageSize = cli.size.parse().map_err(|err: String| anyhow!(err))?;

    let Some(resolved) = KeyResolver::from_process(cli.env_file.as_deref()).resolve() else {
        eprintln!("Error: {}", missing_key_help());
        return Ok(1);
    };

    let request = GenerationRequest {
        prompt: cli.prompt.clone(),
        aspect_ratio: cli.aspect_ratio,
        size,
        model: cli.model.clone(),
        references: cli.references.clone(),
        grounding: cli.grounding,
    };

    let events = match cli.events.as_ref() {
        Some(path) => EventWriter::new(path, new_run_id()),
        None => EventWriter::disabled(),
    };
    let engine = ImageEngine::new(GeminiClient::from_env()?, events, cli.on_multiple_images);
    let model = engine.model_spec(&request.model);

    print_rule();
    println!("Gemini Image Generation");
    print_rule();
    println!("Model:        {} ({})", request.model, model.label);
    println!("Aspect Ratio: {}", request.aspect_ratio);
    println!("Image Size:   {}", request.size);
    println!("Grounding:    {}", request.grounding);
    println!("Output:       {}", cli.output.display());
    println!("Prompt:       {}", banner_prompt(&request.prompt));
    if !request.references.is_empty() {
        println!(
            "References:   {} image(s) (max {MAX_REFERENCE_IMAGES})",
            request.references.len()
        );
    }
    println!("API key:      {}", resolved.source);
    print_rule();

    if !model.supports_image_config() {
        println!("Note: Flash model - using default aspect ratio and size");
    }

    match generate(&engine, &cli, &request, &resolved.key) {
        Ok(bytes) => {
            print_rule();
            println!("SUCCESS!");
            print_rule();
            println!("Output: {}", cli.output.display());
            println!("Size:   {} bytes", format_thousands(bytes));
            print_rule();
            Ok(0)
        }
        Err(err) => {
            engine.fail(&err);
            Err(err)
        }
    }
}

fn generate(
    engine: &ImageEngine,
    cli: &Cli,
    request: &GenerationRequest,
    api_key: &str,
) -> Result<u64> {
    engine.start(request)?;

    println!("Building request...");
    let prepared = engine.prepare(request)?;

    println!("Calling Gemini API...");
    let response = engine.send(api_key, &prepared)?;

    println!("Extracting image from response...");
    let extraction = engine.extract(&response)?;
    if let Some(preview) = extraction.text_preview() {
        println!("Model response: {preview}");
    }
    let saved = engine.save(&response, &extraction, &cli.output)?;
    if let (Some(width), Some(height)) = (saved.width, saved.height) {
        println!("Dimensions: {width}x{height}");
    }

    if let Some(receipt) = cli.receipt.as_deref() {
        engine.write_receipt(receipt, request, &prepared, &response, &extraction, &saved)?;
        println!("Receipt: {}", receipt.display());
    }
    Ok(saved.bytes_written)
}

fn print_rule() {
    println!("{}", "=".repeat(BANNER_WIDTH));
}

fn banner_prompt(prompt: &str) -> String {
    let truncated: String = prompt.chars().take(PROMPT_BANNER_CHARS).collect();
    format!("{truncated}...")
}

fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
