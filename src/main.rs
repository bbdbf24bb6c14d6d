fn main() {
    if let Err(err) = reading_kiosk_lib::run() {
        log::error!("reading kiosk failed: {err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
