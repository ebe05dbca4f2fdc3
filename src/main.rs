fn main() {
    #[cfg(feature = "cli")]
    mjo::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("mjo: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
