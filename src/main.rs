fn main() {
    if let Err(err) = weatherxm_station::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
