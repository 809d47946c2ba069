//! Simple HTTP server for the browser calculator.
//!
//! Serves a single HTML page with both calculators and a small JSON API the
//! page calls on every (debounced) input change. Connections are handled one
//! at a time on the calling thread.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::params::{compute_results, ComputeInput};
use crate::presets::catalog;
use crate::render::{render_params, render_speed};
use crate::speed::{estimate_speed, SpeedInput};

/// Largest request body accepted.
const MAX_BODY: usize = 1 << 20;

/// Largest request line plus headers accepted.
const MAX_HEAD: u64 = 16 * 1024;

/// Per-connection read and write timeout.
const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the HTTP server until the process is stopped.
pub fn run_server(host: &str, port: u16) -> io::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)?;

    info!("serving calculator at http://{}", addr);
    println!("=== MoE Calculator ===");
    println!("Server running at: http://{}", addr);
    println!("Press Ctrl+C to stop\n");

    serve(&listener, IO_TIMEOUT);
    Ok(())
}

/// Accept connections one at a time. A client that stalls longer than
/// `timeout` is dropped and the loop moves on.
fn serve(listener: &TcpListener, timeout: Duration) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(e) = handle_connection(stream, timeout) {
                    warn!("connection error: {}", e);
                }
            }
            Err(e) => warn!("accept error: {}", e),
        }
    }
}

/// A parsed HTTP request line plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// A response ready to be written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string(),
        }
    }

    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }

    /// Serialize as an HTTP/1.1 response.
    pub fn to_http(&self) -> String {
        let status_text = match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            413 => "Payload Too Large",
            422 => "Unprocessable Entity",
            500 => "Internal Server Error",
            _ => "Unknown",
        };

        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            status_text,
            self.content_type,
            self.body.len(),
            self.body
        )
    }
}

fn handle_connection(mut stream: TcpStream, timeout: Duration) -> io::Result<()> {
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let response = match read_request(&mut stream)? {
        Some(request) => {
            debug!("{} {}", request.method, request.path);
            route(&request)
        }
        None => Response::text(413, "Payload Too Large"),
    };

    stream.write_all(response.to_http().as_bytes())?;
    stream.flush()
}

/// Read the request line, headers and body. `None` when the body is too large.
fn read_request(stream: &mut TcpStream) -> io::Result<Option<Request>> {
    let mut reader = BufReader::new(stream);

    let (method, path, content_length) = {
        let mut head = (&mut reader).take(MAX_HEAD);

        let first_line = read_head_line(&mut head)?;
        let mut parts = first_line.split_whitespace();
        let method = parts.next().unwrap_or("").to_string();
        let path = parts.next().unwrap_or("").to_string();

        let mut content_length = 0usize;
        loop {
            let line = read_head_line(&mut head)?;
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }
        (method, path, content_length)
    };

    if content_length > MAX_BODY {
        return Ok(None);
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    Ok(Some(Request {
        method,
        path,
        body: String::from_utf8_lossy(&body).into_owned(),
    }))
}

/// One header line. Fails when the head budget runs out mid-line.
fn read_head_line<R: BufRead>(head: &mut R) -> io::Result<String> {
    let mut line = String::new();
    let n = head.read_line(&mut line)?;
    if n > 0 && !line.ends_with('\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "request head too large",
        ));
    }
    Ok(line)
}

/// Dispatch a request to its handler.
pub fn route(request: &Request) -> Response {
    let path = request.path.split('?').next().unwrap_or("");
    match (request.method.as_str(), path) {
        ("GET", "/") | ("GET", "/index.html") => Response {
            status: 200,
            content_type: "text/html",
            body: HTML.to_string(),
        },
        ("GET", "/api/presets") => match serde_json::to_value(catalog()) {
            Ok(value) => Response::json(200, &value),
            Err(e) => Response::json(500, &json!({ "error": e.to_string() })),
        },
        ("POST", "/api/params") => with_fields(&request.body, serve_params),
        ("POST", "/api/speed") => with_fields(&request.body, serve_speed),
        _ => Response::text(404, "Not Found"),
    }
}

/// Parse a JSON object body into string form fields and hand it to `handler`.
fn with_fields(body: &str, handler: fn(&HashMap<String, String>) -> Response) -> Response {
    match form_fields(body) {
        Ok(fields) => handler(&fields),
        Err(e) => {
            warn!("rejecting malformed body: {}", e);
            Response::json(400, &json!({ "error": format!("Malformed request: {}", e) }))
        }
    }
}

/// Flatten a JSON object into form fields. Strings pass through, booleans and
/// numbers are stringified, nulls are dropped.
pub fn form_fields(body: &str) -> Result<HashMap<String, String>, serde_json::Error> {
    let object: HashMap<String, Value> = serde_json::from_str(body)?;
    Ok(object
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            Value::Bool(b) => Some((k, b.to_string())),
            Value::Number(n) => Some((k, n.to_string())),
            _ => None,
        })
        .collect())
}

fn serve_params(fields: &HashMap<String, String>) -> Response {
    let input = ComputeInput::from_fields(fields);
    let result = compute_results(&input);
    Response::json(
        200,
        &json!({ "result": result, "html": render_params(&input, &result) }),
    )
}

fn serve_speed(fields: &HashMap<String, String>) -> Response {
    match SpeedInput::from_fields(fields) {
        Ok(input) => {
            let result = estimate_speed(&input);
            Response::json(
                200,
                &json!({
                    "input": input,
                    "result": result,
                    "html": render_speed(&input, &result),
                }),
            )
        }
        Err(e) => {
            debug!("speed input rejected: {}", e);
            Response::json(422, &json!({ "error": e.to_string(), "field": e.field() }))
        }
    }
}

const HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>MoE Calculator</title>
    <style>
        :root {
            --bg-primary: #0a0f14;
            --bg-secondary: #111820;
            --bg-tertiary: #1a2332;
            --accent-primary: #3b82f6;
            --accent-warning: #f59e0b;
            --accent-danger: #ef4444;
            --text-primary: #f1f5f9;
            --text-secondary: #94a3b8;
            --border-color: #1e293b;
            --space-2: 8px;
            --space-4: 16px;
            --space-5: 24px;
            --font-sans: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
            --font-mono: 'JetBrains Mono', 'Fira Code', monospace;
            --radius-md: 10px;
        }
        * { box-sizing: border-box; }
        body { margin: 0; background: var(--bg-primary); color: var(--text-primary); font-family: var(--font-sans); }
        header { padding: var(--space-4) var(--space-5); border-bottom: 1px solid var(--border-color); }
        main { display: grid; grid-template-columns: 1fr 1fr; gap: var(--space-5); padding: var(--space-5); }
        section { background: var(--bg-secondary); border: 1px solid var(--border-color); border-radius: var(--radius-md); padding: var(--space-4); }
        h2 { margin-top: 0; font-size: 1.1rem; }
        label { display: block; font-size: 0.8rem; color: var(--text-secondary); margin-top: var(--space-2); }
        input, select, textarea { width: 100%; background: var(--bg-tertiary); color: var(--text-primary); border: 1px solid var(--border-color); border-radius: 6px; padding: 6px; font-family: var(--font-mono); }
        input[type=checkbox] { width: auto; }
        textarea { min-height: 70px; }
        .row { display: grid; grid-template-columns: 1fr 1fr; gap: var(--space-2); }
        table { width: 100%; border-collapse: collapse; margin-top: var(--space-4); font-size: 0.85rem; }
        td { padding: 4px 6px; border-bottom: 1px solid var(--border-color); }
        td.id { color: var(--text-secondary); width: 2.5em; }
        td.val { text-align: right; font-family: var(--font-mono); }
        td.formula { color: var(--text-secondary); font-family: var(--font-mono); }
        tr.em td { color: var(--accent-warning); font-weight: 600; }
        .error { color: var(--accent-danger); margin-top: var(--space-2); min-height: 1.2em; }
        @media (max-width: 1000px) { main { grid-template-columns: 1fr; } }
    </style>
</head>
<body>
    <header><strong>MoE Calculator</strong> &middot; parameter counts and bandwidth-bound token speed</header>
    <main>
        <section>
            <h2>Speed</h2>
            <form id="speed-form">
                <label>GPU 1 preset <select data-target="gpu1"></select></label>
                <div class="row">
                    <label>GPU 1 VRAM (GB)<input name="gpu1_vram_gb" value="24"></label>
                    <label>GPU 1 bandwidth (GB/s)<input name="gpu1_bw_gbps" value="1008"></label>
                </div>
                <label>GPU 2 preset <select data-target="gpu2"></select></label>
                <div class="row">
                    <label>GPU 2 VRAM (GB)<input name="gpu2_vram_gb" value="24"></label>
                    <label>GPU 2 bandwidth (GB/s)<input name="gpu2_bw_gbps" value="936"></label>
                </div>
                <label>System memory preset <select id="ram-preset"></select></label>
                <label>System RAM bandwidth (GB/s)<input name="sys_bw_gbps" value="89.6"></label>
                <label>Model preset <select id="model-preset"></select></label>
                <div class="row">
                    <label>Total params (B)<input name="total_params_b" value="46.7"></label>
                    <label>Dense params (B)<input name="dense_params_b" value="1.6"></label>
                    <label>Active MoE params (B)<input name="active_moe_params_b" value="11.3"></label>
                    <label>KV cache (GB)<input name="kv_cache_gb" value="1.07"></label>
                </div>
                <label>Quantization (bits)<input name="quant_bits" value="4.5"></label>
            </form>
            <div class="error" id="speed-error"></div>
            <table><tbody id="speed-results"></tbody></table>
        </section>
        <section>
            <h2>Parameters</h2>
            <form id="params-form">
                <label>Architecture preset <select id="arch-preset"></select></label>
                <div class="row">
                    <label>Dense layers<input name="dense_layers" value="0"></label>
                    <label>MoE layers<input name="moe_layers" value="0"></label>
                    <label>Experts per layer<input name="experts_per_layer" value="0"></label>
                    <label>Active experts<input name="active_experts" value="0"></label>
                </div>
                <label>Dense layer shapes<textarea name="dense_shapes"></textarea></label>
                <label>MoE layer base shapes (attention, norms, router)<textarea name="moe_base_shapes"></textarea></label>
                <label>Expert shapes<textarea name="expert_shapes"></textarea></label>
                <label><input type="checkbox" name="has_shared_expert"> Shared expert</label>
                <div class="row">
                    <label>Shared experts<input name="shared_experts" value="0"></label>
                    <label>Scope
                        <select name="shared_scope">
                            <option value="per_layer">per layer</option>
                            <option value="global">whole model</option>
                        </select>
                    </label>
                </div>
                <label>Shared expert shapes<textarea name="shared_expert_shapes"></textarea></label>
                <label>Embedding and head shapes<textarea name="embedding_shapes"></textarea></label>
            </form>
            <table><tbody id="params-results"></tbody></table>
        </section>
    </main>
    <script>
        let presets = null;
        const timers = {};

        function debounce(key, fn, ms) {
            clearTimeout(timers[key]);
            timers[key] = setTimeout(fn, ms);
        }

        function formFields(form) {
            const fields = {};
            for (const el of form.elements) {
                if (!el.name) continue;
                fields[el.name] = el.type === 'checkbox' ? el.checked : el.value;
            }
            return fields;
        }

        async function post(url, fields) {
            const res = await fetch(url, {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify(fields),
            });
            return { ok: res.ok, data: await res.json() };
        }

        async function updateSpeed() {
            const { ok, data } = await post('/api/speed', formFields(document.getElementById('speed-form')));
            document.getElementById('speed-error').textContent = ok ? '' : data.error;
            document.getElementById('speed-results').innerHTML = ok ? data.html : '';
        }

        async function updateParams() {
            const { data } = await post('/api/params', formFields(document.getElementById('params-form')));
            document.getElementById('params-results').innerHTML = data.html;
        }

        function setField(form, name, value) {
            const el = form.elements[name];
            if (!el) return;
            if (el.type === 'checkbox') el.checked = !!value; else el.value = value;
        }

        function fillSelect(select, items, placeholder) {
            select.innerHTML = `<option value="">${placeholder}</option>`;
            items.forEach(p => {
                const opt = document.createElement('option');
                opt.value = p.id;
                opt.textContent = p.name;
                select.appendChild(opt);
            });
        }

        async function loadPresets() {
            const res = await fetch('/api/presets');
            presets = await res.json();
            const speed = document.getElementById('speed-form');
            const params = document.getElementById('params-form');

            document.querySelectorAll('select[data-target]').forEach(select => {
                fillSelect(select, presets.gpus, 'custom');
                select.addEventListener('change', () => {
                    const gpu = presets.gpus.find(g => g.id === select.value);
                    if (!gpu) return;
                    const slot = select.dataset.target;
                    setField(speed, `${slot}_vram_gb`, gpu.vram_gb);
                    setField(speed, `${slot}_bw_gbps`, gpu.bw_gbps);
                    updateSpeed();
                });
            });

            const ram = document.getElementById('ram-preset');
            fillSelect(ram, presets.memory, 'custom');
            ram.addEventListener('change', () => {
                const m = presets.memory.find(x => x.id === ram.value);
                if (m) { setField(speed, 'sys_bw_gbps', m.bw_gbps); updateSpeed(); }
            });

            const model = document.getElementById('model-preset');
            fillSelect(model, presets.models, 'custom');
            model.addEventListener('change', () => {
                const m = presets.models.find(x => x.id === model.value);
                if (!m) return;
                ['total_params_b', 'dense_params_b', 'active_moe_params_b', 'kv_cache_gb']
                    .forEach(k => setField(speed, k, m[k]));
                updateSpeed();
            });

            const arch = document.getElementById('arch-preset');
            fillSelect(arch, presets.architectures, 'custom');
            arch.addEventListener('change', () => {
                const a = presets.architectures.find(x => x.id === arch.value);
                if (!a) return;
                Object.entries(a.input).forEach(([k, v]) => setField(params, k, v));
                updateParams();
            });
        }

        document.getElementById('speed-form').addEventListener('submit', e => { e.preventDefault(); updateSpeed(); });
        document.getElementById('params-form').addEventListener('submit', e => e.preventDefault());
        document.getElementById('speed-form').addEventListener('input', () => debounce('speed', updateSpeed, 250));
        document.getElementById('params-form').addEventListener('input', () => debounce('params', updateParams, 250));
        document.getElementById('params-form').addEventListener('change', () => debounce('params', updateParams, 250));

        loadPresets().then(() => { updateSpeed(); updateParams(); });
    </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::thread;

    use super::*;

    fn post(path: &str, body: &str) -> Request {
        Request {
            method: "POST".into(),
            path: path.into(),
            body: body.into(),
        }
    }

    fn get(path: &str) -> Request {
        Request {
            method: "GET".into(),
            path: path.into(),
            body: String::new(),
        }
    }

    #[test]
    fn test_index_served() {
        let res = route(&get("/"));
        assert_eq!(res.status, 200);
        assert_eq!(res.content_type, "text/html");
        assert!(res.body.contains("speed-form"));
    }

    #[test]
    fn test_unknown_route() {
        assert_eq!(route(&get("/nope")).status, 404);
        assert_eq!(route(&get("/api/speed")).status, 404);
    }

    #[test]
    fn test_presets_endpoint() {
        let res = route(&get("/api/presets?x=1"));
        assert_eq!(res.status, 200);
        let value: Value = serde_json::from_str(&res.body).unwrap();
        assert!(value["gpus"].as_array().map_or(false, |a| !a.is_empty()));
    }

    #[test]
    fn test_params_endpoint_never_fails() {
        let res = route(&post("/api/params", r#"{"dense_layers": "x", "has_shared_expert": true}"#));
        assert_eq!(res.status, 200);
        let value: Value = serde_json::from_str(&res.body).unwrap();
        assert_eq!(value["result"]["total_params"], 0);
        assert!(value["html"].as_str().unwrap().contains("AJ"));
    }

    #[test]
    fn test_params_endpoint_sums_shapes() {
        let body = r#"{"moe_layers": "2", "expert_shapes": "[2,3]\n[4]", "experts_per_layer": 4, "active_experts": "9"}"#;
        let value: Value = serde_json::from_str(&route(&post("/api/params", body)).body).unwrap();
        assert_eq!(value["result"]["expert_params"], 10);
        assert_eq!(value["result"]["active_experts"], 4);
        assert_eq!(value["result"]["total_params"], 80);
    }

    #[test]
    fn test_speed_endpoint_validation_message() {
        let res = route(&post("/api/speed", r#"{"gpu1_vram_gb": "24"}"#));
        assert_eq!(res.status, 422);
        let value: Value = serde_json::from_str(&res.body).unwrap();
        assert_eq!(value["field"], "gpu1_bw_gbps");
        assert!(value["error"].as_str().unwrap().contains("gpu1_bw_gbps"));
    }

    #[test]
    fn test_speed_endpoint_ok() {
        let body = serde_json::to_string(&SpeedInput::default()).unwrap();
        let res = route(&post("/api/speed", &body));
        assert_eq!(res.status, 200);
        let value: Value = serde_json::from_str(&res.body).unwrap();
        assert!(value["result"]["tokens_per_sec"].as_f64().unwrap() > 0.0);
        assert_eq!(value["input"]["quant_bits"], 4.5);
    }

    #[test]
    fn test_malformed_body() {
        assert_eq!(route(&post("/api/params", "not json")).status, 400);
        assert_eq!(route(&post("/api/speed", "[1,2]")).status, 400);
    }

    #[test]
    fn test_form_fields_flattening() {
        let fields = form_fields(r#"{"a": "1", "b": true, "c": 2.5, "d": null}"#).unwrap();
        assert_eq!(fields.get("a").map(String::as_str), Some("1"));
        assert_eq!(fields.get("b").map(String::as_str), Some("true"));
        assert_eq!(fields.get("c").map(String::as_str), Some("2.5"));
        assert!(!fields.contains_key("d"));
    }

    #[test]
    fn test_http_serialization() {
        let http = Response::text(404, "Not Found").to_http();
        assert!(http.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(http.contains("Content-Length: 9\r\n"));
        assert!(http.ends_with("\r\n\r\nNot Found"));
    }

    #[test]
    fn test_head_line_budget() {
        let mut head = "GET / HTTP/1.1\r\n".as_bytes().take(8);
        let err = read_head_line(&mut head).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut head = "GET / HTTP/1.1\r\n".as_bytes().take(MAX_HEAD);
        assert_eq!(read_head_line(&mut head).unwrap(), "GET / HTTP/1.1\r\n");
    }

    // ------------------------------------------------------------------------
    // Over a real socket
    // ------------------------------------------------------------------------

    fn spawn_server(timeout: Duration) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || serve(&listener, timeout));
        addr
    }

    fn open(addr: SocketAddr, raw: &str) -> TcpStream {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        stream.write_all(raw.as_bytes()).unwrap();
        stream
    }

    fn exchange(addr: SocketAddr, raw: &str) -> String {
        let mut stream = open(addr, raw);
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        out
    }

    fn post_raw(path: &str, body: &str) -> String {
        format!(
            "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            path,
            body.len(),
            body
        )
    }

    #[test]
    fn test_socket_post_reads_body() {
        let addr = spawn_server(Duration::from_secs(2));
        let out = exchange(addr, &post_raw("/api/params", r#"{"moe_layers": "2", "expert_shapes": "[2,3]", "experts_per_layer": "1"}"#));
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{}", out);
        assert!(out.contains("\"total_params\":12"), "{}", out);
    }

    #[test]
    fn test_socket_oversize_body_rejected() {
        let addr = spawn_server(Duration::from_secs(2));
        let raw = format!(
            "POST /api/params HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY + 1
        );
        let out = exchange(addr, &raw);
        assert!(out.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{}", out);
    }

    #[test]
    fn test_idle_client_does_not_block_others() {
        let addr = spawn_server(Duration::from_millis(200));
        let _idle = TcpStream::connect(addr).unwrap();

        let out = exchange(addr, "GET /api/presets HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{}", out);
    }

    #[test]
    fn test_short_body_does_not_block_others() {
        let addr = spawn_server(Duration::from_millis(200));
        let raw = "POST /api/params HTTP/1.1\r\nContent-Length: 100\r\n\r\n{}";
        let mut short = open(addr, raw);

        let out = exchange(addr, &post_raw("/api/params", "{}"));
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{}", out);

        // The stalled client is dropped without an answer.
        let mut answer = String::new();
        let _ = short.read_to_string(&mut answer);
        assert!(!answer.starts_with("HTTP/1.1"));
    }

    #[test]
    fn test_unterminated_head_does_not_block_others() {
        let addr = spawn_server(Duration::from_millis(200));
        let raw = format!("GET /{}", "a".repeat(MAX_HEAD as usize + 1));
        let _flood = open(addr, &raw);

        let out = exchange(addr, "GET / HTTP/1.1\r\n\r\n");
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{}", out);
    }
}
