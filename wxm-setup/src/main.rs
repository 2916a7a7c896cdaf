fn main() {
    if let Err(err) = weatherxm_station::app::run_setup() {
        eprintln!("station setup failed: {err}");
        std::process::exit(1);
    }
}
