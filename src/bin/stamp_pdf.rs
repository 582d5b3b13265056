//! Stamp a PDF with a QR code
//!
//! Places the QR stamp on page 1 the same way the portal's editor does:
//! the marker position is given in pixels of a rendered page and mapped
//! to PDF coordinates.
//!
//! Usage:
//!   cargo run --release --bin stamp_pdf -- input.pdf output.pdf --url https://portal.example?v=AB12CD
//!   cargo run --release --bin stamp_pdf -- input.pdf output.pdf --slug AB12CD --render 650x919 --marker 305,879
//!
//! Options:
//!   --url URL          Link target (default: landing URL for --slug, or a new slug)
//!   --slug SLUG        Slug used to build the landing URL from the configured origin
//!   --render WxH       Size of the rendered page in pixels (default: native size)
//!   --marker X,Y       Marker top-left in render pixels (default: page centre)
//!   --qr FILE          PNG or JPEG to embed instead of generating a QR code
//!   --password PW      Password for encrypted documents
//!   --config FILE      Portal configuration (JSON)

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use qr_stamp::encryption::{NoPrompt, PasswordPrompt, StaticPassword};
use qr_stamp::geometry::Point;
use qr_stamp::mapper::{centered_marker, clamp_marker, CoordinateMapper, RenderedPage};
use qr_stamp::portal::links::{generate_slug, landing_url};
use qr_stamp::writer::{first_page_box, BarcodeGenerator, DocumentStamper, StampRequest};
use qr_stamp::{PortalConfig, Result};

#[derive(Default)]
struct StampArgs {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    url: Option<String>,
    slug: Option<String>,
    render: Option<(f32, f32)>,
    marker: Option<(f32, f32)>,
    qr: Option<PathBuf>,
    password: Option<String>,
    config: Option<PathBuf>,
}

fn parse_pair(value: &str, sep: char) -> Option<(f32, f32)> {
    let (a, b) = value.split_once(sep)?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

impl StampArgs {
    fn from_args() -> std::result::Result<Self, String> {
        let args: Vec<String> = std::env::args().collect();
        let mut parsed = Self::default();

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            let mut value = || {
                i += 1;
                args.get(i).cloned().ok_or_else(|| format!("{} needs a value", flag))
            };
            match flag {
                "--url" => parsed.url = Some(value()?),
                "--slug" => parsed.slug = Some(value()?),
                "--render" => {
                    let v = value()?;
                    parsed.render = Some(parse_pair(&v, 'x').ok_or_else(|| format!("bad --render {}", v))?);
                },
                "--marker" => {
                    let v = value()?;
                    parsed.marker = Some(parse_pair(&v, ',').ok_or_else(|| format!("bad --marker {}", v))?);
                },
                "--qr" => parsed.qr = Some(PathBuf::from(value()?)),
                "--password" => parsed.password = Some(value()?),
                "--config" => parsed.config = Some(PathBuf::from(value()?)),
                other if other.starts_with("--") => return Err(format!("unknown option {}", other)),
                path if parsed.input.is_none() => parsed.input = Some(PathBuf::from(path)),
                path if parsed.output.is_none() => parsed.output = Some(PathBuf::from(path)),
                extra => return Err(format!("unexpected argument {}", extra)),
            }
            i += 1;
        }

        if parsed.input.is_none() || parsed.output.is_none() {
            return Err("usage: stamp_pdf INPUT OUTPUT [--url URL] [--render WxH] [--marker X,Y]".into());
        }
        Ok(parsed)
    }
}

fn run(args: StampArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => PortalConfig::from_json_file(path)?,
        None => PortalConfig::default(),
    };
    let (Some(input), Some(output)) = (&args.input, &args.output) else {
        return Ok(());
    };
    let source = fs::read(input)?;

    let mut prompt: Box<dyn PasswordPrompt> = match &args.password {
        Some(pw) => Box::new(StaticPassword::new(pw.clone())),
        None => Box::new(NoPrompt),
    };

    let native = first_page_box(&source, prompt.as_mut())?;
    let (rw, rh) = args.render.unwrap_or((native.width, native.height));
    let page = RenderedPage::new(rw, rh, native.width, native.height);

    let mapper = CoordinateMapper::from_config(&config.stamp);
    let size = mapper.stamp_size();
    let marker = match args.marker {
        Some((x, y)) => clamp_marker(&page, Point::new(x, y), size),
        None => centered_marker(&page, size),
    };
    let coordinate = mapper.map(&page, marker);

    let url = match (&args.url, &args.slug) {
        (Some(url), _) => url.clone(),
        (None, Some(slug)) => landing_url(&config.origin, slug),
        (None, None) => landing_url(&config.origin, &generate_slug()),
    };
    let qr = match &args.qr {
        Some(path) => fs::read(path)?,
        None => BarcodeGenerator::generate_portal_qr(&url, config.qr_pixel_size)?,
    };

    let stamper = DocumentStamper::new(config.stamp.clone());
    let stamped = stamper.stamp(&source, &StampRequest::new(qr, url.clone(), coordinate), prompt.as_mut())?;
    fs::write(output, &stamped)?;

    println!("Stamped {} -> {}", input.display(), output.display());
    println!("  link:   {}", url);
    println!(
        "  stamp:  ({:.1}, {:.1}) on a {:.0}x{:.0} pt page{}",
        coordinate.x,
        coordinate.y,
        native.width,
        native.height,
        if coordinate.fallback_applied {
            " (bottom fallback)"
        } else {
            ""
        }
    );
    println!("  output: {} bytes", stamped.len());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match StampArgs::from_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return ExitCode::from(2);
        },
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.needs_password() {
                eprintln!("Hint: pass --password for encrypted documents");
            }
            ExitCode::FAILURE
        },
    }
}
