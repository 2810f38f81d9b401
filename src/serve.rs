//! Development server with live reload support.
//!
//! A lightweight HTTP server on `tiny_http` that:
//!
//! - serves static files from the build output directory
//! - resolves the configured index document (and per-directory `index.html`)
//! - injects the live-reload client script into HTML responses in watch mode
//! - shuts down gracefully on Ctrl+C
//!
//! The file watcher runs on its own thread (see [`crate::watch`]); rebuilds
//! signal connected browsers through the [`crate::reload::ReloadHub`].

use crate::{
    build::BuildContext,
    config::SiteConfig,
    log,
    reload::ReloadHub,
    watch::watch_for_changes_blocking,
};
use anyhow::{Context, Result};
use std::{
    fs,
    io::Cursor,
    net::SocketAddr,
    path::Path,
    sync::Arc,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

/// Injected before `</body>` of served HTML pages in watch mode.
const RELOAD_SCRIPT: &str = concat!(
    "<script>(() => {",
    " const ws = new WebSocket(`ws://${location.hostname}:__RELOAD_PORT__`);",
    " ws.onmessage = () => location.reload();",
    " })();</script>"
);

/// Start the development server with optional file watching.
///
/// Blocks until Ctrl+C.
pub fn serve_site(config: &'static SiteConfig, ctx: Arc<BuildContext>) -> Result<()> {
    let interface: std::net::IpAddr = config.serve.interface.parse()?;

    let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    // Set up Ctrl+C handler for graceful shutdown
    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    log!("serve"; "http://{}", addr);

    // Spawn reload hub + file watcher thread
    if config.serve.watch {
        let reload = ReloadHub::start(SocketAddr::new(interface, config.reload_port()))?;
        std::thread::spawn(move || {
            if let Err(err) = watch_for_changes_blocking(config, ctx, reload) {
                log!("watch"; "{err:#}");
            }
        });
    }

    // Handle requests in main thread (blocks until Ctrl+C)
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, config) {
            log!("serve"; "request error: {e}");
        }
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(
    interface: std::net::IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr)> {
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(_) if offset + 1 < max_retries => continue,
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to bind after {} attempts (ports {}-{}): {}",
                    max_retries,
                    base_port,
                    port,
                    e
                ));
            }
        }
    }
    unreachable!()
}

/// Handle a single HTTP request.
///
/// Resolution order:
/// 1. Exact file match → serve file
/// 2. Site root → configured index document
/// 3. Directory with index.html → serve index.html
/// 4. Nothing found → 404
fn handle_request(request: Request, config: &SiteConfig) -> Result<()> {
    let serve_root = &config.build.output;

    // Decode URL-encoded characters (e.g., %20 → space) and strip any
    // query string (cache-busting URLs like "app.css?t=123")
    let url_path = urlencoding::decode(request.url())
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_default();
    let path_without_query = url_path.split('?').next().unwrap_or(&url_path);
    let request_path = path_without_query.trim_matches('/');
    let local_path = serve_root.join(request_path);

    if local_path.is_file() {
        return serve_file(request, &local_path, config);
    }

    if local_path.is_dir() {
        // Site root falls back to the configured index document first
        if request_path.is_empty() {
            let index = local_path.join(&config.serve.index);
            if index.is_file() {
                return serve_file(request, &index, config);
            }
        }
        let index = local_path.join("index.html");
        if index.is_file() {
            return serve_file(request, &index, config);
        }
    }

    serve_not_found(request)
}

/// Serve a file with appropriate content type.
///
/// HTML responses get the live-reload script injected in watch mode.
fn serve_file(request: Request, path: &Path, config: &SiteConfig) -> Result<()> {
    let content_type = guess_content_type(path);
    let is_html = content_type.starts_with("text/html");

    let content = if is_html && config.serve.watch {
        let html = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        inject_reload_script(&html, config.reload_port()).into_bytes()
    } else {
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
    };

    let response = Response::from_data(content)
        .with_header(Header::from_bytes("Content-Type", content_type).unwrap());
    request.respond(response)?;
    Ok(())
}

/// Serve 404 Not Found response.
fn serve_not_found(request: Request) -> Result<()> {
    let response = Response::new(
        StatusCode(404),
        vec![Header::from_bytes("Content-Type", "text/plain").unwrap()],
        Cursor::new("404 Not Found"),
        Some(13),
        None,
    );
    request.respond(response)?;
    Ok(())
}

/// Splice the reload client script into an HTML document.
///
/// Inserted before `</body>` when present, appended otherwise.
fn inject_reload_script(html: &str, reload_port: u16) -> String {
    let script = RELOAD_SCRIPT.replace("__RELOAD_PORT__", &reload_port.to_string());
    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + script.len());
            out.push_str(&html[..pos]);
            out.push_str(&script);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{script}"),
    }
}

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        // Documents
        Some("txt") => "text/plain; charset=utf-8",

        // Default binary
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_reload_script_before_body_close() {
        let html = "<html><body><p>x</p></body></html>";
        let out = inject_reload_script(html, 8001);

        assert!(out.contains("ws://${location.hostname}:8001"));
        assert!(out.ends_with("</body></html>"));
        let script_pos = out.find("<script>").unwrap();
        let body_pos = out.find("</body>").unwrap();
        assert!(script_pos < body_pos);
    }

    #[test]
    fn test_inject_reload_script_appends_without_body() {
        let out = inject_reload_script("<p>fragment</p>", 9001);
        assert!(out.starts_with("<p>fragment</p><script>"));
        assert!(out.contains(":9001"));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(
            guess_content_type(Path::new("a.html")),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            guess_content_type(Path::new("a.css")),
            "text/css; charset=utf-8"
        );
        assert_eq!(guess_content_type(Path::new("a.png")), "image/png");
        assert_eq!(
            guess_content_type(Path::new("a.unknown")),
            "application/octet-stream"
        );
    }
}
