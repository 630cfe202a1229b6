//! Benchmark tests for critical operations
//!
//! Run with: cargo test bench --release -- --ignored --nocapture

use std::time::Instant;

use url::Url;

use browser_relay::guard::SsrfGuard;
use browser_relay::model::RewriteContext;
use browser_relay::rewrite::{rewrite_css, rewrite_html};

/// Benchmark helper to measure execution time
fn benchmark<F>(name: &str, iterations: usize, mut f: F)
where
    F: FnMut(),
{
    let start = Instant::now();

    for _ in 0..iterations {
        f();
    }

    let duration = start.elapsed();
    let avg_ms = duration.as_millis() as f64 / iterations as f64;
    let ops_per_sec = (iterations as f64 / duration.as_secs_f64()) as u64;

    println!("  {} ({} iterations)", name, iterations);
    println!("    Total time: {:?}", duration);
    println!("    Avg time: {:.3}ms", avg_ms);
    println!("    Throughput: {} ops/sec\n", ops_per_sec);
}

/// Builds a page with `links` anchors, images and srcset candidates
fn sample_page(links: usize) -> String {
    let mut html = String::from(
        r#"<!DOCTYPE html><html><head><meta http-equiv="Content-Security-Policy" content="default-src 'self'"><link rel="stylesheet" href="/static/site.css"></head><body>"#,
    );
    for i in 0..links {
        html.push_str(&format!(
            r#"<div class="card"><a href="/item/{i}">Item {i}</a><img src="//cdn.example.com/{i}.png" srcset="/img/{i}-1x.png 1x, /img/{i}-2x.png 2x"><p>Some text for item {i}</p></div>"#
        ));
    }
    html.push_str(r#"<script src="/static/app.js"></script></body></html>"#);
    html
}

fn sample_css(rules: usize) -> String {
    (0..rules)
        .map(|i| format!(".c{i} {{ background: url('/img/{i}.png') no-repeat; }}\n"))
        .collect()
}

fn ctx() -> RewriteContext {
    RewriteContext::from_url(&Url::parse("https://example.com/catalog/index.html").unwrap())
}

#[test]
#[ignore] // Run explicitly with: cargo test bench --release -- --ignored --nocapture
fn bench_rewrite_html() {
    println!("\n=== Benchmark: HTML Rewrite ===\n");

    let ctx = ctx();
    let small = sample_page(10);
    let large = sample_page(1000);

    benchmark("Small page (10 cards)", 1000, || {
        let _ = rewrite_html(&small, &ctx);
    });

    benchmark("Large page (1000 cards)", 50, || {
        let _ = rewrite_html(&large, &ctx);
    });
}

#[test]
#[ignore]
fn bench_rewrite_css() {
    println!("\n=== Benchmark: CSS Rewrite ===\n");

    let ctx = ctx();
    let css = sample_css(500);

    benchmark("Stylesheet (500 rules)", 500, || {
        let _ = rewrite_css(&css, &ctx);
    });
}

#[test]
#[ignore]
fn bench_guard_checks() {
    println!("\n=== Benchmark: SSRF Guard ===\n");

    let guard = SsrfGuard::default();
    let public = Url::parse("https://www.example.com/path?q=1").unwrap();
    let private = Url::parse("http://192.168.10.20/admin").unwrap();
    let mapped = Url::parse("http://[::ffff:10.0.0.1]/").unwrap();

    benchmark("Public hostname", 100_000, || {
        let _ = guard.check_url(&public);
    });

    benchmark("Private IPv4 literal", 100_000, || {
        let _ = guard.check_url(&private);
    });

    benchmark("IPv4-mapped IPv6 literal", 100_000, || {
        let _ = guard.check_url(&mapped);
    });
}

#[test]
#[ignore]
fn bench_summary() {
    println!("\n╔════════════════════════════════════════════╗");
    println!("║      Content Relay Benchmark Summary       ║");
    println!("╚════════════════════════════════════════════╝\n");
    println!("Run individual benchmarks with:");
    println!("  cargo test bench_rewrite_html --release -- --ignored --nocapture");
    println!("  cargo test bench_rewrite_css --release -- --ignored --nocapture");
    println!("  cargo test bench_guard_checks --release -- --ignored --nocapture");
    println!("\nOr run all benchmarks:");
    println!("  cargo test bench --release -- --ignored --nocapture\n");
}
