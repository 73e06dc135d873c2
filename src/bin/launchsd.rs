fn main() {
    std::process::exit(launchsd::run_launchsd());
}
