//! services/api/src/bin/openapi.rs
//!
//! Dumps the OpenAPI document of the study API.
//!
//! Usage: `openapi [PATH]`. Without a path the document goes to
//! `openapi.json`; a path of `-` prints it to stdout instead.

use api_lib::web::ApiDoc;
use std::io::Write;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let document = ApiDoc::openapi().to_pretty_json()?;

    match std::env::args().nth(1).as_deref() {
        Some("-") => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(document.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
        target => {
            let path = target.unwrap_or(DEFAULT_OUTPUT);
            std::fs::write(path, &document)?;
            eprintln!("Wrote {} bytes of OpenAPI JSON to {}", document.len(), path);
        }
    }
    Ok(())
}
