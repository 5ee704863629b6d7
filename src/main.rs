//! Headless batch entry point: load an image, optionally run complex
//! operations, apply the slider transforms, save the result as PNG.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use pixelstudio::mask::{
    EdgeSegmentationProvider, HostedVisionConfig, HostedVisionProvider, MaskProvider,
};
use pixelstudio::settings::PaletteParameter;
use pixelstudio::EditorService;

fn usage() -> ! {
    eprintln!("Usage: pixelstudio <input> <output> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --block-size <n>      pixel block size, 1-50 (default 1)");
    eprintln!("  --palette <k>         target palette size: 4|8|16|32|64|128|256");
    eprintln!("  --levels <d>,<l>      clip darkest d% to black, lightest l% to white");
    eprintln!("  --remove-bg [mode]    remove background; mode is 'edge' (default) or 'hosted'");
    eprintln!();
    eprintln!("The hosted mask provider reads MASK_SERVICE_ENDPOINT and");
    eprintln!("MASK_SERVICE_API_KEY from the environment.");
    std::process::exit(2);
}

struct Options {
    input: PathBuf,
    output: PathBuf,
    block_size: u32,
    palette: Option<u16>,
    levels: Option<(f32, f32)>,
    remove_bg: Option<String>,
}

fn parse_args() -> Result<Options> {
    let argv: Vec<String> = env::args().skip(1).collect();
    if argv.len() < 2 || argv[0] == "--help" {
        usage();
    }

    let mut options = Options {
        input: PathBuf::from(&argv[0]),
        output: PathBuf::from(&argv[1]),
        block_size: 1,
        palette: None,
        levels: None,
        remove_bg: None,
    };

    let mut i = 2;
    while i < argv.len() {
        match argv[i].as_str() {
            "--block-size" => {
                i += 1;
                let value = argv.get(i).context("--block-size needs a value")?;
                options.block_size = value.parse().context("invalid block size")?;
            }
            "--palette" => {
                i += 1;
                let value = argv.get(i).context("--palette needs a value")?;
                options.palette = Some(value.parse().context("invalid palette size")?);
            }
            "--levels" => {
                i += 1;
                let value = argv.get(i).context("--levels needs d,l")?;
                let (d, l) = value
                    .split_once(',')
                    .context("--levels expects two comma-separated percentages")?;
                options.levels = Some((
                    d.trim().parse().context("invalid darks cutoff")?,
                    l.trim().parse().context("invalid lights cutoff")?,
                ));
            }
            "--remove-bg" => {
                // Optional mode argument right after the flag
                match argv.get(i + 1).filter(|m| !m.starts_with("--")) {
                    Some(mode) => {
                        options.remove_bg = Some(mode.clone());
                        i += 1;
                    }
                    None => options.remove_bg = Some("edge".to_string()),
                }
            }
            other => bail!("unknown flag: {}", other),
        }
        i += 1;
    }

    Ok(options)
}

fn build_provider(mode: &str) -> Result<Arc<dyn MaskProvider>> {
    match mode {
        "edge" => Ok(Arc::new(EdgeSegmentationProvider::default())),
        "hosted" => {
            let endpoint = env::var("MASK_SERVICE_ENDPOINT")
                .context("MASK_SERVICE_ENDPOINT is not set")?;
            let api_key =
                env::var("MASK_SERVICE_API_KEY").context("MASK_SERVICE_API_KEY is not set")?;
            let provider = HostedVisionProvider::new(HostedVisionConfig::new(endpoint, api_key))?;
            Ok(Arc::new(provider))
        }
        other => bail!("unknown mask provider '{}'; use 'edge' or 'hosted'", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let options = parse_args()?;
    let service = EditorService::new();

    service
        .load_from_path(options.input.clone())
        .await
        .with_context(|| format!("failed to load {}", options.input.display()))?;

    if let Some(mode) = &options.remove_bg {
        let provider = build_provider(mode)?;
        service.remove_background(provider, Vec::new()).await?;
    }

    if let Some((darks, lights)) = options.levels {
        service.adjust_levels(darks, lights).await?;
    }

    service.set_block_size(options.block_size)?;
    if let Some(k) = options.palette {
        service.set_palette(PaletteParameter::TargetK(k))?;
    }

    let written = service.save_to_path(options.output.clone()).await?;

    if let Some(stats) = service.statistics() {
        println!(
            "{} -> {} ({}x{}, {} distinct colors)",
            options.input.display(),
            written.display(),
            stats.width,
            stats.height,
            stats.distinct_color_count
        );
    }

    Ok(())
}
