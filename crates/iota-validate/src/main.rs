use std::path::PathBuf;
use std::process;

use iota_validate::error::ValidateError;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let (file, expect_package) = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!();
            eprintln!("Usage: iota-validate <file.go> [--package <name>]");
            eprintln!();
            eprintln!("Arguments:");
            eprintln!("  <file.go>          Go source exposing func Name(p string) (string, error)");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --package <name>   Fail unless the declared package matches");
            process::exit(2);
        }
    };

    if let Err(e) = run(&file, expect_package.as_deref()) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<(PathBuf, Option<String>), String> {
    let mut file: Option<PathBuf> = None;
    let mut package = None;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--package" => {
                i += 1;
                package = Some(args.get(i).ok_or("--package requires a value")?.clone());
            }
            "--help" | "-h" => return Err("".to_string()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => {
                if file.is_some() {
                    return Err(format!("unexpected argument: {arg}"));
                }
                file = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    let file = file.ok_or("missing required argument: <file.go>")?;
    Ok((file, package))
}

fn run(file: &std::path::Path, expect_package: Option<&str>) -> Result<(), ValidateError> {
    let source = std::fs::read_to_string(file)
        .map_err(|e| ValidateError::Other(format!("failed to read {}: {e}", file.display())))?;

    let endpoint = iota_validate::validate_source(&source)?;

    if let Some(expected) = expect_package
        && !iota_validate::check_package(&endpoint, expected)
    {
        return Err(ValidateError::Other(format!(
            "source package name '{}' does not match expected package '{expected}'",
            endpoint.package
        )));
    }

    let json = serde_json::to_string_pretty(&endpoint)
        .map_err(|e| ValidateError::Other(format!("JSON serialization failed: {e}")))?;

    println!("{json}");

    Ok(())
}
