//! Minimal static file server for test pages and audited pages.
//!
//! One server per test run or audit, always on the same port, so callers
//! must [`WebServer::stop`] before the next one starts. The only feature
//! beyond plain file serving is the remap table, which lets `/bundle.js`
//! point at whichever build output is under test.

use crate::catalog::Catalog;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::schema::ExperimentConfiguration;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

type Remaps = Arc<RwLock<BTreeMap<String, PathBuf>>>;

struct Listening {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    acceptor: JoinHandle<()>,
}

pub struct WebServer {
    root: PathBuf,
    remaps: Remaps,
    listening: Option<Listening>,
}

/// Where a request ends up.
#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    BadPath,
    File(PathBuf),
}

impl WebServer {
    /// An empty root serves the working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut root = root.into();
        if root.as_os_str().is_empty() {
            root = PathBuf::from(".");
        }
        Self {
            root,
            remaps: Arc::default(),
            listening: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serves `target` verbatim whenever `path` is requested.
    pub fn remap(&self, path: &str, target: impl Into<PathBuf>) {
        let mut remaps = self.remaps.write().unwrap_or_else(|e| e.into_inner());
        remaps.insert(path.to_string(), target.into());
    }

    /// Binds `127.0.0.1:port` and starts accepting. Port 0 picks a free one.
    pub fn start(&mut self, port: u16) -> Result<SocketAddr> {
        if let Some(listening) = &self.listening {
            return Ok(listening.addr);
        }

        let listener = TcpListener::bind(("127.0.0.1", port))?;
        let addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));

        let acceptor = {
            let shutdown = Arc::clone(&shutdown);
            let root = self.root.clone();
            let remaps = Arc::clone(&self.remaps);
            thread::spawn(move || accept_loop(listener, &shutdown, &root, &remaps))
        };

        debug!(%addr, root = %self.root.display(), "server listening");
        self.listening = Some(Listening {
            addr,
            shutdown,
            acceptor,
        });
        Ok(addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.as_ref().map(|l| l.addr)
    }

    /// Closes the listener and waits for the accept loop to exit.
    pub fn stop(&mut self) -> Result<()> {
        let Some(listening) = self.listening.take() else {
            return Ok(());
        };
        listening.shutdown.store(true, Ordering::SeqCst);
        // Wake the blocking accept.
        let _ = TcpStream::connect(listening.addr);
        listening
            .acceptor
            .join()
            .map_err(|_| Error::Net(io::Error::other("server thread panicked")))?;
        debug!(addr = %listening.addr, "server stopped");
        Ok(())
    }

    pub fn route(&self, target: &str) -> Route {
        let remaps = self.remaps.read().unwrap_or_else(|e| e.into_inner());
        route(&self.root, &remaps, target)
    }

    /// The `serve` invocation reproducing this server by hand.
    pub fn cmdline(&self) -> String {
        let mut cmd = format!("js-min-bench serve --root={}", self.root.display());
        let remaps = self.remaps.read().unwrap_or_else(|e| e.into_inner());
        for (src, dst) in remaps.iter() {
            cmd.push_str(&format!(" --remap={src}={}", dst.display()));
        }
        cmd
    }
}

impl Drop for WebServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Starts a server for `configuration` (the baseline experiment when
/// `None`): its input's test webroot, with `/bundle.js` mapped to the
/// experiment's build output.
pub fn serve(
    settings: &Settings,
    catalog: &Catalog,
    configuration: Option<&ExperimentConfiguration>,
) -> Result<WebServer> {
    let configuration = configuration.cloned().unwrap_or_default();
    let webroot = catalog
        .inputs
        .get(configuration.experiment_identifier())
        .and_then(|input| input.test.as_ref())
        .map(|test| test.webroot.as_str())
        .unwrap_or("");

    let mut server = WebServer::new(webroot);
    let bundle = settings.data_dir().join(configuration.to_string());
    info!(bundle = %bundle.display(), "mapping /bundle.js");
    server.remap("/bundle.js", bundle);

    let addr = server.start(settings.port)?;
    info!("serving at http://localhost:{}", addr.port());
    Ok(server)
}

fn accept_loop(listener: TcpListener, shutdown: &AtomicBool, root: &Path, remaps: &Remaps) {
    for stream in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let Ok(stream) = stream else { continue };
        let root = root.to_path_buf();
        let remaps = Arc::clone(remaps);
        thread::spawn(move || {
            if let Err(e) = handle(stream, &root, &remaps) {
                debug!(error = %e, "request aborted");
            }
        });
    }
}

fn handle(mut stream: TcpStream, root: &Path, remaps: &Remaps) -> io::Result<()> {
    let target = {
        let mut reader = BufReader::new(&stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line)?;
        // Drain headers; nothing in them matters here.
        let mut line = String::new();
        while reader.read_line(&mut line)? > 2 {
            line.clear();
        }
        request_line
            .split_whitespace()
            .nth(1)
            .unwrap_or("/")
            .to_string()
    };

    let route = {
        let remaps = remaps.read().unwrap_or_else(|e| e.into_inner());
        route(root, &remaps, &target)
    };

    match route {
        Route::BadPath => respond(&mut stream, 400, "Bad Request", b"bad path")?,
        Route::File(path) => match open_file(&path) {
            Ok((mut file, len)) => {
                write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n"
                )?;
                io::copy(&mut file, &mut stream)?;
            }
            Err(e) => respond(
                &mut stream,
                500,
                "Internal Server Error",
                format!("{}: {e}", path.display()).as_bytes(),
            )?,
        },
    }
    stream.flush()?;
    let _ = stream.shutdown(Shutdown::Write);
    Ok(())
}

fn open_file(path: &Path) -> io::Result<(File, u64)> {
    let file = File::open(path)?;
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(io::Error::other("not a regular file"));
    }
    Ok((file, meta.len()))
}

fn respond(stream: &mut TcpStream, status: u16, reason: &str, body: &[u8]) -> io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )?;
    stream.write_all(body)
}

fn route(root: &Path, remaps: &BTreeMap<String, PathBuf>, target: &str) -> Route {
    let path_only = target.split(['?', '#']).next().unwrap_or("");
    let mut path = normalize(path_only);
    if !path.starts_with('/') {
        return Route::BadPath;
    }
    if path.ends_with('/') {
        path.push_str("index.html");
    }

    match remaps.get(&path) {
        Some(target) => Route::File(PathBuf::from(normalize(&target.to_string_lossy()))),
        None => Route::File(root.join(path.trim_start_matches('/'))),
    }
}

/// POSIX-style lexical normalization: collapses `.`, `..` and repeated
/// separators, keeping a trailing slash.
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let absolute = path.starts_with('/');
    let trailing = path.ends_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }

    let mut out = parts.join("/");
    if absolute {
        out.insert(0, '/');
    }
    if out.is_empty() {
        out.push('.');
    }
    if trailing && !out.ends_with('/') {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use tempfile::tempdir;

    fn get(addr: SocketAddr, path: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(stream, "GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        let status = response[9..12].parse().unwrap();
        let body = response
            .split_once("\r\n\r\n")
            .map(|(_, b)| b.to_string())
            .unwrap_or_default();
        (status, body)
    }

    #[test]
    fn normalize_behaves_like_posix() {
        assert_eq!(normalize("/a/./b//c/"), "/a/b/c/");
        assert_eq!(normalize("/a/../../etc/passwd"), "/etc/passwd");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("a/../.."), "..");
        assert_eq!(normalize(""), ".");
        assert_eq!(normalize("*"), "*");
    }

    #[test]
    fn routes_index_remaps_and_bad_paths() {
        let server = WebServer::new("www");
        server.remap("/bundle.js", "out/data/../data/x.raw");

        assert_eq!(server.route("/"), Route::File(PathBuf::from("www/index.html")));
        assert_eq!(
            server.route("/js/app.js?v=2"),
            Route::File(PathBuf::from("www/js/app.js"))
        );
        assert_eq!(
            server.route("/bundle.js"),
            Route::File(PathBuf::from("out/data/x.raw"))
        );
        assert_eq!(
            server.route("/x/../bundle.js"),
            Route::File(PathBuf::from("out/data/x.raw"))
        );
        assert_eq!(server.route("*"), Route::BadPath);
    }

    #[test]
    fn serves_files_remaps_and_errors() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("www");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("index.html"), "<p>hi</p>").unwrap();
        let bundle = dir.path().join("built.js");
        fs::write(&bundle, "console.log(1)").unwrap();

        let mut server = WebServer::new(&root);
        server.remap("/bundle.js", &bundle);
        let addr = server.start(0).unwrap();

        assert_eq!(get(addr, "/"), (200, "<p>hi</p>".to_string()));
        assert_eq!(get(addr, "/bundle.js"), (200, "console.log(1)".to_string()));
        assert_eq!(get(addr, "relative").0, 400);

        let (status, body) = get(addr, "/missing.js");
        assert_eq!(status, 500);
        assert!(body.contains("missing.js"), "body was {body:?}");

        server.stop().unwrap();
        assert!(server.local_addr().is_none());
        assert!(TcpStream::connect(addr).is_err());
    }

    #[test]
    fn port_is_reusable_after_stop() {
        let dir = tempdir().unwrap();
        let mut first = WebServer::new(dir.path());
        let addr = first.start(0).unwrap();
        first.stop().unwrap();

        let mut second = WebServer::new(dir.path());
        assert_eq!(second.start(addr.port()).unwrap(), addr);
    }

    #[test]
    fn cmdline_lists_remaps() {
        let server = WebServer::new("third_party/todomvc/react");
        server.remap("/bundle.js", "out/data/todomvc-react.raw");
        assert_eq!(
            server.cmdline(),
            "js-min-bench serve --root=third_party/todomvc/react \
             --remap=/bundle.js=out/data/todomvc-react.raw"
        );
    }

    #[test]
    fn serve_defaults_to_the_baseline_experiment() {
        let settings = Settings {
            port: 0,
            ..Default::default()
        };
        let catalog = Catalog::builtin(Path::new("."));

        let mut server = serve(&settings, &catalog, None).unwrap();
        assert!(server.local_addr().is_some());
        assert_eq!(server.root(), Path::new("third_party/todomvc/react"));
        assert_eq!(
            server.route("/bundle.js"),
            Route::File(PathBuf::from("out/data/todomvc-react.raw"))
        );
        server.stop().unwrap();

        let configuration =
            ExperimentConfiguration::for_input("todomvc-react", "terser", Some("compress-mangle"));
        let server = serve(&settings, &catalog, Some(&configuration)).unwrap();
        assert_eq!(
            server.route("/bundle.js"),
            Route::File(PathBuf::from("out/data/todomvc-react.terser-compress-mangle"))
        );
    }

    #[test]
    fn inputs_without_a_test_page_serve_the_working_directory() {
        let settings = Settings {
            port: 0,
            ..Default::default()
        };
        let catalog = Catalog::builtin(Path::new("."));
        let configuration = ExperimentConfiguration::for_input("react", "raw", None);

        let server = serve(&settings, &catalog, Some(&configuration)).unwrap();
        assert_eq!(server.root(), Path::new("."));
    }
}
