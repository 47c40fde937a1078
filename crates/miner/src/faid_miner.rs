fn main() {
    if let Err(err) = faid_miner::cli::run_entry() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
