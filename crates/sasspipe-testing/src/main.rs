use std::io;

use sasspipe_testing::{MockCompiler, VERSION_JSON};

fn main() {
    if std::env::args().any(|arg| arg == "--version") {
        println!("{VERSION_JSON}");
        return;
    }

    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    let mut mock = MockCompiler::new(stdin, stdout);
    if let Err(err) = mock.run() {
        eprintln!("sasspipe-mockc: {err}");
        std::process::exit(1);
    }
}
