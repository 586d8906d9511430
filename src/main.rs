fn main() {
    #[cfg(feature = "cli")]
    blocksync::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("blocksync: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
