//! DockLaunch Agent - 仓库一键部署代理
//!
//! Usage:
//! - Normal mode: `docklaunch-agent`
//! - With custom port: `docklaunch-agent --port 9000`

use docklaunch_agent::RuntimeConfig;

/// 解析命令行参数
fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                if config.port_override.is_none() {
                    eprintln!("Ignoring invalid port: {}", args[i + 1]);
                }
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("DockLaunch Agent - 仓库一键部署代理");
    println!();
    println!("USAGE:");
    println!("    docklaunch-agent [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the listening port");
    println!("    -h, --help       Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    DOCKLAUNCH_PORT, DOCKLAUNCH_BASE_DIR, DOCKLAUNCH_STORE_PATH,");
    println!("    DOCKER_PATH, GIT_PATH, NGROK_PATH, NGROK_ARGS, NGROK_API_URL, NGROK_CONFIG, ...");
    println!();
    println!("EXAMPLES:");
    println!("    docklaunch-agent                 # Listen on 0.0.0.0:8000");
    println!("    docklaunch-agent --port 9000     # Custom port");
}

fn main() {
    let config = parse_args();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(docklaunch_agent::init_and_run_agent_with_config(config)) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
