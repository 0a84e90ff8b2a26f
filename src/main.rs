use colored::Colorize;
use syncflux::app::{self, RunContext};
use syncflux::cli::{version_line, Cli};
use syncflux::logging::Logger;

fn main() {
    let cli = Cli::parse_args();

    if cli.version {
        println!("{}", version_line());
        return;
    }

    let logger = match Logger::install() {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("{} {e}", "✗".red().bold());
            std::process::exit(e.exit_code());
        }
    };

    std::process::exit(app::run(&cli, RunContext::production(logger)));
}
