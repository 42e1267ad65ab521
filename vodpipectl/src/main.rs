use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = vodpipectl::Cli::parse();
    vodpipectl::init_tracing(cli.verbose);
    tokio::select! {
        result = vodpipectl::run(cli) => {
            if let Err(err) = result {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted; state saved up to the last finished step");
            std::process::exit(130);
        }
    }
}
