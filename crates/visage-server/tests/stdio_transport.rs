//! Full-process test: spawn the server binary and speak JSON-RPC over its
//! stdio.

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use visage_crypto::{ClientRegistry, RsaKeyPair, TokenAuthority};

struct ServerProcess {
    child: Child,
    reader: BufReader<std::process::ChildStdout>,
    _dir: tempfile::TempDir,
}

impl ServerProcess {
    fn spawn() -> (Self, String) {
        let dir = tempfile::TempDir::new().unwrap();

        // Provision keys, a client and a token before the server starts so
        // both sides share the same key material
        let keypair = RsaKeyPair::load_or_generate(&dir.path().join("keys")).unwrap();
        let registry = ClientRegistry::open(dir.path().join("clients.json")).unwrap();
        let creds = registry.create_client("stdio test").unwrap();
        let authority = TokenAuthority::new(&keypair, registry, 3600).unwrap();
        let token = authority
            .issue_token(&creds.client_id, &creds.client_secret)
            .unwrap();

        let mut child = Command::new(env!("CARGO_BIN_EXE_visage-server"))
            .env("VISAGE_DATA_DIR", dir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("server binary spawns");

        let stdout = child.stdout.take().unwrap();
        (
            Self {
                child,
                reader: BufReader::new(stdout),
                _dir: dir,
            },
            token,
        )
    }

    fn call(&mut self, id: u64, method: &str, params: Value) -> Value {
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let stdin = self.child.stdin.as_mut().unwrap();
        writeln!(stdin, "{}", request).unwrap();
        stdin.flush().unwrap();

        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        // Closing stdin ends the serve loop
        drop(self.child.stdin.take());
        let _ = self.child.wait();
    }
}

#[test]
fn health_status_over_stdio() {
    let (mut server, token) = ServerProcess::spawn();

    let response = server.call(1, "get_health_status", json!({"access_token": token}));
    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["overall"], "healthy");
}

#[test]
fn unknown_method_over_stdio() {
    let (mut server, token) = ServerProcess::spawn();

    let response = server.call(7, "bogus_tool", json!({"access_token": token}));
    assert_eq!(response["error"]["code"], -32601);
}

#[test]
fn unauthenticated_over_stdio() {
    let (mut server, _token) = ServerProcess::spawn();

    let response = server.call(2, "list_users", json!({"access_token": "junk"}));
    assert_eq!(response["result"]["status"], "error");
    assert_eq!(response["result"]["kind"], "unauthenticated");
}
