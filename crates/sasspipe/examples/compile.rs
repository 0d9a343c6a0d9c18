//! Compile a stylesheet from stdin or the command line.
//!
//! ```sh
//! cargo run --example compile -- 'div { color: #ccc; }'
//! SASS_COMPILER=/path/to/dart-sass-embedded cargo run --example compile
//! ```

use std::io::Read;

use sasspipe::{Args, Options, OutputStyle, Transpiler};

fn main() -> Result<(), sasspipe::Error> {
    let source = match std::env::args().nth(1) {
        Some(source) => source,
        None => {
            let mut source = String::new();
            std::io::stdin().read_to_string(&mut source)?;
            source
        }
    };

    let transpiler = Transpiler::start(Options {
        filename: std::env::var("SASS_COMPILER").unwrap_or_default(),
        ..Options::default()
    })?;

    let result = transpiler.execute(Args {
        source,
        output_style: OutputStyle::Expanded,
        ..Args::default()
    })?;
    println!("{}", result.css);

    transpiler.close()
}
