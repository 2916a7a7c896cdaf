fn main() {
    if let Err(err) = weatherxm_station::app::run_service() {
        eprintln!("service startup failed: {err}");
        std::process::exit(1);
    }
}
