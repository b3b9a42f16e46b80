fn main() {
    if let Err(err) = equipment_monitor::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
