//! Command-line shell around the reader core: opens a book root, pages
//! through it and optionally exports the prepared page as PNG. Stands in
//! for the on-device UI during development.

use std::env;
use std::process::ExitCode;

use inkomik_core::{
    ArchiveRegistry, Book, BookExplorer, CacheScaler, DecodeOptions, DecoderRegistry, EntryKinds,
    FilePath, Image, OsFileManager, ScreenSize, SortOrder,
};

fn usage() -> ! {
    eprintln!(
        "Usage:\n  inkomik <root> [--list] [--pages N] [--screen WxH] [--order word|number] [--export out.png]\n\nDefaults: --pages 1 --screen 600x800 --order word"
    );
    std::process::exit(2);
}

fn parse_size(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

struct Options {
    root: String,
    list: bool,
    pages: usize,
    screen: ScreenSize,
    order: SortOrder,
    export: Option<String>,
}

fn parse_args() -> Options {
    let mut args = env::args().skip(1);
    let root = match args.next() {
        Some(root) if !root.starts_with("--") => root,
        _ => usage(),
    };

    let mut options = Options {
        root,
        list: false,
        pages: 1,
        screen: ScreenSize::new(600, 800),
        order: SortOrder::WordNumber,
        export: None,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--list" => options.list = true,
            "--pages" => {
                let value = args.next().unwrap_or_default();
                options.pages = match value.parse() {
                    Ok(pages) => pages,
                    Err(_) => usage(),
                };
            }
            "--screen" => {
                let value = args.next().unwrap_or_default();
                match parse_size(&value) {
                    Some((w, h)) => options.screen = ScreenSize::new(w, h),
                    None => usage(),
                }
            }
            "--order" => {
                let value = args.next().unwrap_or_default();
                options.order = match value.as_str() {
                    "word" => SortOrder::WordNumber,
                    "number" => SortOrder::Number,
                    _ => usage(),
                };
            }
            "--export" => {
                let value = args.next().unwrap_or_default();
                if value.is_empty() {
                    usage();
                }
                options.export = Some(value);
            }
            _ => usage(),
        }
    }
    options
}

fn export_png(image: &Image, path: &str) -> Result<(), String> {
    // Strip row padding; the PNG encoder expects packed rows.
    let packed = image.scanline(false);
    let mut rows = Vec::with_capacity(packed * image.height() as usize);
    for y in 0..image.height() {
        rows.extend_from_slice(&image.row(y)[..packed]);
    }

    let color = match image.depth() {
        1 => image::ExtendedColorType::L8,
        3 => image::ExtendedColorType::Rgb8,
        _ => image::ExtendedColorType::Rgba8,
    };
    image::save_buffer_with_format(
        path,
        &rows,
        image.width(),
        image.height(),
        color,
        image::ImageFormat::Png,
    )
    .map_err(|err| err.to_string())
}

fn main() -> ExitCode {
    env_logger::init();
    let options = parse_args();

    let root = FilePath::new(&options.root, false);

    if options.list {
        let mut explorer = BookExplorer::new(
            Box::new(OsFileManager::new()),
            ArchiveRegistry::with_default_formats(),
        );
        explorer.set_sort_order(options.order);
        if !explorer.set_root(&root) {
            eprintln!("cannot open {}", options.root);
            return ExitCode::FAILURE;
        }
        for entry in explorer.file_list() {
            println!("{entry}");
        }
        return ExitCode::SUCCESS;
    }

    let mut explorer = BookExplorer::with_entry_kinds(
        Box::new(OsFileManager::new()),
        ArchiveRegistry::with_default_formats(),
        EntryKinds::Files,
    );
    explorer.set_sort_order(options.order);

    let mut book = Book::new(
        explorer,
        DecoderRegistry::with_default_decoders(DecodeOptions::default()),
    );
    book.set_cache_prototype(Some(Box::new(CacheScaler::new(options.screen))));

    if !book.set_root(&root) || !book.to_first_file() {
        eprintln!("no readable pages under {}", options.root);
        return ExitCode::FAILURE;
    }

    println!("{}", book.bookmark().current_file);
    for page in 1..options.pages {
        if !book.increment_position() {
            log::info!("book ends after {page} pages");
            break;
        }
        println!("{}", book.bookmark().current_file);
        book.preload();
    }

    if let Some(export) = options.export.as_deref() {
        let scaler = book
            .current_cache()
            .and_then(|cache| cache.as_any().downcast_ref::<CacheScaler>());
        let prepared = match scaler {
            Some(scaler) => scaler
                .scaled_gray()
                .visible()
                .unwrap_or_else(|| scaler.scaled_gray().image.clone()),
            None => match book.current_image() {
                Some(image) => image.clone(),
                None => {
                    eprintln!("nothing to export");
                    return ExitCode::FAILURE;
                }
            },
        };
        if let Err(err) = export_png(&prepared, export) {
            eprintln!("export failed: {err}");
            return ExitCode::FAILURE;
        }
        println!("wrote {export}");
    }

    ExitCode::SUCCESS
}
