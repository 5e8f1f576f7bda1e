fn main() {
    if let Err(err) = labelvault::run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
