//! Gateway end-to-end tests over an in-memory upstream

use pretty_assertions::assert_eq;
use std::sync::Arc;
use tsgate_cache::MemoryStore;
use tsgate_server::{server, Gateway, Settings};
use tsgate_test_utils::{http_date, url, StaticUpstream, LIB_BASE, ORIGIN};
use tsgate_upstream::{with_bypass_marker, FreshnessMarker, UpstreamRequest, UpstreamResponse};

const TSCONFIG: &str = r#"{ "compilerOptions": { "target": "es2020" } }"#;

fn gateway(upstream: &Arc<StaticUpstream>) -> Gateway {
    let settings = Settings {
        upstream: ORIGIN.to_string(),
        lib_base: LIB_BASE.to_string(),
        ..Settings::default()
    };
    Gateway::with_parts(settings, upstream.clone(), Arc::new(MemoryStore::default())).unwrap()
}

async fn get(gateway: &Gateway, path: &str) -> UpstreamResponse {
    gateway
        .interceptor()
        .handle(UpstreamRequest::get(url(path)))
        .await
}

fn app() -> StaticUpstream {
    StaticUpstream::new()
        .with_file("/tsconfig.json", TSCONFIG)
        .with_file_modified(
            "/src/main.ts",
            "import { twice } from './util';\nconst n: number = twice(2);\nconsole.log(n);\n",
            1_000,
        )
        .with_file_modified(
            "/src/util.ts",
            "export function twice(x: number): number {\n  return x * 2;\n}\n",
            1_000,
        )
}

#[tokio::test]
async fn compiles_requested_module() {
    let upstream = Arc::new(app());
    let gateway = gateway(&upstream);

    let response = get(&gateway, "/src/main.ts").await;

    assert_eq!(response.status, 200, "{}", response.text());
    assert_eq!(response.header("content-type"), Some("application/javascript"));
    assert_eq!(response.header("last-modified"), Some(http_date(1_000).as_str()));
    let body = response.text();
    assert!(body.contains("from '/src/util.ts'"), "{body}");
    assert!(body.contains("const n = twice(2);"), "{body}");
}

#[tokio::test]
async fn every_compiled_module_is_cached() {
    let upstream = Arc::new(app());
    let gateway = gateway(&upstream);
    get(&gateway, "/src/main.ts").await;

    let cache = gateway.interceptor().handler().cache();
    let util = cache.get(&url("/src/util.ts")).await.unwrap();
    assert!(util.body.contains("export function twice(x) {"));
    assert_eq!(util.last_modified, FreshnessMarker::parse(&http_date(1_000)).unwrap());

    // served from the cache: no new pass, so no new tsconfig fetch
    let response = get(&gateway, "/src/util.ts").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), util.body);
    assert_eq!(upstream.fetch_count(&url("/tsconfig.json")), 1);
}

#[tokio::test]
async fn stale_entries_are_recompiled() {
    let upstream = Arc::new(app());
    let gateway = gateway(&upstream);
    get(&gateway, "/src/main.ts").await;
    get(&gateway, "/src/main.ts").await;
    assert_eq!(upstream.fetch_count(&url("/tsconfig.json")), 1);

    upstream.set_file("/src/main.ts", "export const changed = true;\n");
    upstream.set_last_modified("/src/main.ts", Some(2_000));
    let response = get(&gateway, "/src/main.ts").await;

    assert_eq!(upstream.fetch_count(&url("/tsconfig.json")), 2);
    assert_eq!(response.text(), "export const changed = true;\n");
    assert_eq!(response.header("last-modified"), Some(http_date(2_000).as_str()));
}

#[tokio::test]
async fn modules_without_marker_are_never_cached() {
    let upstream = Arc::new(
        StaticUpstream::new()
            .with_file("/tsconfig.json", TSCONFIG)
            .with_file("/src/main.ts", "export const a: string = 'a';\n"),
    );
    let gateway = gateway(&upstream);

    let first = get(&gateway, "/src/main.ts").await;
    let second = get(&gateway, "/src/main.ts").await;

    assert_eq!(first.status, 200);
    assert_eq!(second.text(), "export const a = 'a';\n");
    assert_eq!(first.header("last-modified"), None);
    assert_eq!(upstream.fetch_count(&url("/tsconfig.json")), 2);
    assert!(gateway
        .interceptor()
        .handler()
        .cache()
        .get(&url("/src/main.ts"))
        .await
        .is_none());
}

#[tokio::test]
async fn failed_pass_without_marker_drops_cache_entry() {
    let upstream = Arc::new(app());
    let gateway = gateway(&upstream);
    get(&gateway, "/src/util.ts").await;
    let cache = gateway.interceptor().handler().cache();
    assert!(cache.get(&url("/src/util.ts")).await.is_some());

    upstream.set_file("/src/util.ts", "export function twice(x: number {\n");
    upstream.set_last_modified("/src/util.ts", None);
    let response = get(&gateway, "/src/util.ts").await;

    assert_eq!(response.status, 500);
    assert!(response.text().starts_with("syntactic /src/util.ts"), "{}", response.text());
    assert!(cache.get(&url("/src/util.ts")).await.is_none());
}

#[tokio::test]
async fn upstream_errors_pass_through() {
    let upstream = Arc::new(StaticUpstream::new().with_file("/tsconfig.json", TSCONFIG));
    let gateway = gateway(&upstream);

    let response = get(&gateway, "/src/missing.ts").await;

    assert_eq!(response.status, 404);
    assert_eq!(upstream.fetch_count(&url("/tsconfig.json")), 0);
}

#[tokio::test]
async fn diagnostics_do_not_block_output() {
    let upstream = Arc::new(
        StaticUpstream::new()
            .with_file("/tsconfig.json", TSCONFIG)
            .with_file("/src/main.ts", "const one: number = 'x';\nexport { one };\n"),
    );
    let gateway = gateway(&upstream);

    let response = get(&gateway, "/src/main.ts").await;

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "const one = 'x';\nexport { one };\n");
}

#[tokio::test]
async fn suppressed_output_reports_diagnostics() {
    let upstream = Arc::new(
        StaticUpstream::new()
            .with_file("/tsconfig.json", r#"{ "compilerOptions": { "noEmitOnError": true } }"#)
            .with_file("/src/main.ts", "const one: number = 'x';\nexport { one };\n"),
    );
    let gateway = gateway(&upstream);

    let response = get(&gateway, "/src/main.ts").await;

    assert_eq!(response.status, 500);
    assert_eq!(response.header("content-type"), Some("text/plain; charset=utf-8"));
    assert_eq!(
        response.text(),
        "semantic /src/main.ts (1,7): Type 'string' is not assignable to type 'number'."
    );
}

#[tokio::test]
async fn failed_dependency_fails_the_request() {
    let upstream = Arc::new(
        StaticUpstream::new()
            .with_file("/tsconfig.json", TSCONFIG)
            .with_file("/src/main.ts", "import { gone } from './gone';\nconsole.log(gone);\n"),
    );
    let gateway = gateway(&upstream);

    let response = get(&gateway, "/src/main.ts").await;

    assert_eq!(response.status, 500);
    assert_eq!(response.text(), "404 Not Found: http://app.test/src/gone.ts");
}

#[tokio::test]
async fn tsconfig_failures_are_reported() {
    let upstream = Arc::new(
        StaticUpstream::new()
            .with_status("/tsconfig.json", 403, "Forbidden")
            .with_file("/src/main.ts", "export {};\n"),
    );
    let gateway = gateway(&upstream);
    assert_eq!(get(&gateway, "/src/main.ts").await.text(), "Forbidden");

    upstream.set_file("/tsconfig.json", "{ nope");
    let response = get(&gateway, "/src/main.ts").await;
    assert_eq!(response.status, 500);
    assert_eq!(response.text(), "Unable to parse tsconfig.json file");
}

#[tokio::test]
async fn non_typescript_requests_are_forwarded() {
    let upstream = Arc::new(
        StaticUpstream::new()
            .with_file("/src/app.js", "console.log(1);\n")
            .with_file("/types/env.d.ts", "declare const env: string;\n")
            .with_file("/src/raw.ts", "const x: number = 1;\n"),
    );
    let gateway = gateway(&upstream);

    assert_eq!(get(&gateway, "/src/app.js").await.text(), "console.log(1);\n");
    assert_eq!(
        get(&gateway, "/types/env.d.ts").await.text(),
        "declare const env: string;\n"
    );

    let marked = gateway
        .interceptor()
        .handle(UpstreamRequest::get(with_bypass_marker(&url("/src/raw.ts"))))
        .await;
    assert_eq!(marked.text(), "const x: number = 1;\n");
}

#[tokio::test]
async fn http_front_end_relays_compiled_output() {
    let upstream = Arc::new(app());
    let gateway = Arc::new(gateway(&upstream));
    let routes = server::routes(gateway);

    let response = warp::test::request()
        .method("GET")
        .path("/src/util.ts?v=3")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/javascript"
    );
    let body = String::from_utf8(response.body().to_vec()).unwrap();
    assert!(body.contains("export function twice(x) {"), "{body}");

    let missing = warp::test::request()
        .method("GET")
        .path("/src/nothing.ts")
        .reply(&routes)
        .await;
    assert_eq!(missing.status(), 404);
}
