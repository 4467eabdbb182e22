use clap::Parser;
use vitrine_cli::{CliArgs, Vitrine};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let result = match Vitrine::from_args(&args) {
        Ok(app) => app.run(args).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
