//! x11cell - main entry point

use std::env;
use std::process;
use std::sync::Arc;

use x11cell::server::{listener, ServerConfig, XServer};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    println!("x11cell v{}", VERSION);
    println!("An X11 server core for text-cell display hosts");
    println!();
    println!("Usage: x11cell [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -display <n>          Display number (default: 1)");
    println!("  -tcp                  Listen on TCP (port 6000 + display)");
    println!("  -unix                 Listen on a Unix socket (default on Unix)");
    println!("  -screen <WxH>         Screen size in pixels (default: 1024x768)");
    println!("  -dpi <n>              Font resolution in dots per inch (default: 96)");
    println!("  -h, --help            Show this help message");
    println!();
    println!("Examples:");
    println!("  x11cell -display 1");
    println!("  x11cell -display 2 -tcp -screen 1280x800 -dpi 120");
    println!();
}

#[derive(Debug)]
struct Config {
    display: u16,
    listen_tcp: bool,
    listen_unix: bool,
    server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            display: 1,
            #[cfg(unix)]
            listen_tcp: false,
            #[cfg(not(unix))]
            listen_tcp: true,
            #[cfg(unix)]
            listen_unix: true,
            #[cfg(not(unix))]
            listen_unix: false,
            server: ServerConfig::default(),
        }
    }
}

fn parse_args() -> Result<Config, String> {
    let mut config = Config::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-display" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for -display".to_string());
                }
                config.display = args[i]
                    .parse()
                    .map_err(|_| "Invalid display number".to_string())?;
            }
            "-tcp" => {
                config.listen_tcp = true;
            }
            "-unix" => {
                config.listen_unix = true;
            }
            "-screen" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for -screen".to_string());
                }
                let (w, h) = args[i]
                    .split_once('x')
                    .ok_or_else(|| "Invalid screen size, expected WxH".to_string())?;
                config.server.width = w
                    .parse()
                    .map_err(|_| "Invalid screen width".to_string())?;
                config.server.height = h
                    .parse()
                    .map_err(|_| "Invalid screen height".to_string())?;
            }
            "-dpi" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for -dpi".to_string());
                }
                config.server.dpi = args[i].parse().map_err(|_| "Invalid dpi".to_string())?;
                if config.server.dpi == 0 {
                    return Err("dpi must be nonzero".to_string());
                }
            }
            arg => {
                return Err(format!("Unknown option: {}", arg));
            }
        }
        i += 1;
    }

    Ok(config)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    log::info!("x11cell v{}", VERSION);
    log::info!("display: :{}", config.display);
    log::info!(
        "screen: {}x{} at {} dpi",
        config.server.width,
        config.server.height,
        config.server.dpi
    );

    let server = Arc::new(XServer::new(config.server.clone()));

    #[cfg(unix)]
    if config.listen_unix {
        let path = format!("/tmp/.X11-unix/X{}", config.display);
        if let Err(e) = std::fs::create_dir_all("/tmp/.X11-unix") {
            eprintln!("Error: cannot create socket directory: {}", e);
            process::exit(1);
        }
        if config.listen_tcp {
            // TCP runs on the main thread below
            let server = Arc::clone(&server);
            std::thread::spawn(move || {
                if let Err(e) = listener::start_unix_listener(&path, server) {
                    log::error!("unix listener failed: {}", e);
                }
            });
        } else {
            if let Err(e) = listener::start_unix_listener(&path, server) {
                eprintln!("Error: failed to start unix listener: {}", e);
                process::exit(1);
            }
            return;
        }
    }

    if config.listen_tcp {
        if let Err(e) = listener::start_tcp_listener(config.display, server) {
            eprintln!("Error: failed to start TCP listener: {}", e);
            process::exit(1);
        }
    } else {
        #[cfg(not(unix))]
        {
            eprintln!("Error: no listening endpoint configured");
            process::exit(1);
        }
    }
}
