mod cli;

use clap::Parser;

use cli::decode::DecodeArgs;

#[derive(Parser)]
#[command(
    name = "trellis",
    version,
    about = "Batched Viterbi decoding over categorical sequence files"
)]
struct Cli {
    #[command(flatten)]
    args: DecodeArgs,
}

fn main() {
    let cli = Cli::parse();
    cli::decode::cmd_decode(cli.args);
}
