//! Punto de entrada ("driver").
//!
//! Este módulo expone el REPL y la carga de archivos de inicio. Al
//! arrancar se evalúa `foth.4th` del directorio actual, si existe, y
//! luego cada archivo nombrado en la línea de comandos. Un error en
//! un archivo detiene el procesamiento de ese archivo pero no tumba
//! el REPL: el evaluador se reinicia y se continúa con lo siguiente.

use std::{
    env,
    fs::File,
    io::{self, BufRead, BufReader, Write},
    path::Path,
};

use anyhow::Context;
use clap::{crate_version, Arg, Command};
use log::{debug, error};

use foth::eval::Eval;

fn main() -> anyhow::Result<()> {
    let verbose = env::var_os("DEBUG").map_or(false, |value| !value.is_empty());
    let level = if verbose {
        log::Level::Debug
    } else {
        log::Level::Warn
    };

    simple_logger::init_with_level(level).context("Failed to initialize logging")?;

    // Parsing de CLI
    let args = Command::new("foth")
        .version(crate_version!())
        .about("A simple FORTH-like interpreter")
        .arg(
            Arg::new("files")
                .value_name("FILE")
                .multiple_values(true)
                .help("Source files evaluated before the REPL starts"),
        )
        .get_matches();

    let mut forth = Eval::new();

    // Archivo de inicio opcional, luego los archivos del usuario
    load_file(&mut forth, Path::new("foth.4th"), false);
    for path in args.values_of("files").into_iter().flatten() {
        load_file(&mut forth, Path::new(path), true);
    }

    repl(&mut forth)
}

/// Evalúa un archivo línea por línea. Las líneas que comienzan con
/// `#` se descartan. El primer error detiene el archivo completo.
fn load_file(forth: &mut Eval, path: &Path, required: bool) {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(cause) => {
            if required {
                error!("cannot open {}: {}", path.display(), cause);
            }
            return;
        }
    };

    debug!("loading {}", path.display());

    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(line) => line,
            Err(cause) => {
                error!("cannot read {}: {}", path.display(), cause);
                return;
            }
        };

        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }

        if let Err(cause) = forth.eval(line) {
            println!("ERROR: {}", cause);
            forth.reset();
            return;
        }
    }
}

/// Lee y evalúa líneas hasta el fin de la entrada.
fn repl(forth: &mut Eval) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush().context("Failed to flush stdout")?;

        line.clear();
        let read = stdin
            .read_line(&mut line)
            .context("Failed to read input")?;

        if read == 0 {
            return Ok(());
        }

        if let Err(cause) = forth.eval(line.trim()) {
            println!("ERROR: {}", cause);
            forth.reset();
        }
    }
}
