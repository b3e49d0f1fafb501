// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking Kubernetes API responses and the kubectl binary.

use http::{Request, Response};
use kube::client::Body;
use kube::Client;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

type Key = (String, String);

/// A mock HTTP service that returns predefined responses based on request paths.
///
/// A path registered with a sequence answers with the next response on every
/// request and keeps repeating the last one once the sequence is exhausted.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<Key, VecDeque<(u16, String)>>>>,
    requests: Arc<Mutex<HashMap<Key, usize>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on_get_sequence(path, vec![(status, body.to_string())])
    }

    /// Add successive responses for GET requests matching the exact path
    pub fn on_get_sequence(self, path: &str, responses: Vec<(u16, String)>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(("GET".to_string(), path.to_string()), responses.into());
        self
    }

    /// Number of requests received for the method and exact path
    pub fn request_count(&self, method: &str, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .get(&(method.to_string(), path.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        *self
            .requests
            .lock()
            .unwrap()
            .entry((method.to_string(), path.to_string()))
            .or_insert(0) += 1;

        let mut responses = self.responses.lock().unwrap();
        let queue = responses.get_mut(&(method.to_string(), path.to_string()))?;

        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let response = self.find_response(&method, &path);

        Box::pin(async move {
            let (status, body) = response.unwrap_or_else(|| (404, not_found_json("resource", &path)));
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a mock Deployment JSON response
pub fn deployment_json(name: &str, desired: i32, ready: i32) -> String {
    serde_json::json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "namespace": "default",
            "generation": 1
        },
        "spec": {
            "replicas": desired,
            "selector": { "matchLabels": { "app": name } },
            "template": {
                "metadata": { "labels": { "app": name } },
                "spec": { "containers": [{ "name": name, "image": "nginx" }] }
            }
        },
        "status": {
            "observedGeneration": 1,
            "replicas": desired,
            "updatedReplicas": desired,
            "readyReplicas": ready
        }
    })
    .to_string()
}

/// Create a mock Service JSON response, optionally with a load balancer IP
pub fn service_json(name: &str, service_type: &str, ingress_ip: Option<&str>) -> String {
    let ingress: Vec<serde_json::Value> = ingress_ip
        .map(|ip| vec![serde_json::json!({ "ip": ip })])
        .unwrap_or_default();

    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": name, "namespace": "default" },
        "spec": {
            "type": service_type,
            "selector": { "app": name },
            "ports": [{ "port": 80 }]
        },
        "status": { "loadBalancer": { "ingress": ingress } }
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

/// Create a 403 forbidden response
pub fn forbidden_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" is forbidden", resource, name),
        "reason": "Forbidden",
        "code": 403
    })
    .to_string()
}

/// Write an executable stand-in for kubectl into `dir`.
///
/// Every invocation appends three lines to `<dir>/kubectl.log`: the KUBECONFIG
/// value, whether that file was readable at the time, and the arguments.
/// The script prints `stdout`, writes `stderr` to standard error and exits
/// with `exit_code`.
#[cfg(unix)]
pub fn stub_kubectl(dir: &Path, exit_code: i32, stdout: &str, stderr: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let log = dir.join("kubectl.log");
    let script = format!(
        "#!/bin/sh\n\
         if [ -r \"$KUBECONFIG\" ]; then state=present; else state=missing; fi\n\
         printf '%s\\n%s\\n%s\\n' \"$KUBECONFIG\" \"$state\" \"$*\" >> '{log}'\n\
         printf '%s\\n' '{stdout}'\n\
         printf '%s\\n' '{stderr}' >&2\n\
         exit {exit_code}\n",
        log = log.display(),
        stdout = shell_quote_body(stdout),
        stderr = shell_quote_body(stderr),
        exit_code = exit_code,
    );

    let path = dir.join("kubectl");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Escape `text` for use between single quotes in a shell script
fn shell_quote_body(text: &str) -> String {
    text.replace('\'', "'\\''")
}

/// Invocations recorded by `stub_kubectl`: (KUBECONFIG, file present, args)
pub fn stub_invocations(dir: &Path) -> Vec<(String, bool, String)> {
    let Ok(log) = std::fs::read_to_string(dir.join("kubectl.log")) else {
        return Vec::new();
    };

    log.lines()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|chunk| {
            (
                chunk[0].to_string(),
                chunk.get(1).is_some_and(|l| *l == "present"),
                chunk.get(2).map(|l| l.to_string()).unwrap_or_default(),
            )
        })
        .collect()
}

/// Entries of a directory, empty when it does not exist
pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_body() {
        assert_eq!(shell_quote_body("plain"), "plain");
        assert_eq!(shell_quote_body("doesn't"), "doesn'\\''t");
    }

    #[test]
    fn test_stub_kubectl_prints_quotes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = stub_kubectl(dir.path(), 3, "it's done", "error: doesn't exist");

        let output = std::process::Command::new(&kubectl)
            .arg("apply")
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stdout), "it's done\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "error: doesn't exist\n");
        assert_eq!(stub_invocations(dir.path()).len(), 1);
    }
}
