use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(
    name = "manga-translator-rust",
    version,
    about = "Translate the text of comic pages in place"
)]
struct Cli {
    /// Image file or folder of images (jpg, jpeg, png, bmp, tiff, webp)
    #[arg(short = 'd', long = "data")]
    data: Option<PathBuf>,

    /// Output folder (default: <input folder>/translated)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Target language (default from settings: FR)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Source language (default from settings: EN)
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// DeepL API key (overrides DEEPL_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Font file used to draw translations
    #[arg(long = "font-path")]
    font_path: Option<String>,

    /// Downsample pages wider than this before OCR
    #[arg(long = "max-width")]
    max_width: Option<u32>,

    /// Write OCR debug overlays next to the output
    #[arg(long = "debug-ocr")]
    debug_ocr: bool,

    /// Show installed OCR languages and exit
    #[arg(long = "show-ocr-languages")]
    show_ocr_languages: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    manga_translator_rust::logging::init(cli.verbose)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing the current image");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let output = manga_translator_rust::run(
        manga_translator_rust::Config {
            data: cli.data,
            output: cli.output,
            lang: cli.lang,
            source_lang: cli.source_lang,
            key: cli.key,
            settings_path: cli.read_settings,
            font_path: cli.font_path,
            max_width: cli.max_width,
            debug_ocr: cli.debug_ocr,
            show_ocr_languages: cli.show_ocr_languages,
        },
        &cancel,
    )
    .await?;

    println!("{}", output);
    Ok(())
}
