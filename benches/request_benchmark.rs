use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use trellis::controller::{Context, Controller, HandlerRegistry};
use trellis::output::OutputDocument;
use trellis::router::{normalize, Router};
use trellis::util::minify;
use trellis::{Config, Exception, Lang, Request, Response};

struct Stub;

impl Controller for Stub {
    fn on_index(&mut self, ctx: &mut Context, _: &[String]) -> Result<Response, Exception> {
        ctx.render("<p>stub</p>")
    }

    fn actions(&self) -> &'static [&'static str] {
        &["onSave", "onShowAll"]
    }
}

fn stub() -> Box<dyn Controller> {
    Box::new(Stub)
}

fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new().controller("/", "index", stub);
    for i in 0..20 {
        let group = format!("/section{}", i);
        registry = registry
            .group(&group)
            .controller(&group, "index", stub)
            .controller(&group, "edit", stub);
    }
    registry.group("/users").controller("/users", "edit", stub)
}

fn request_parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse");

    let requests = [
        (
            "simple",
            b"GET / HTTP/1.1\r\nHost: localhost:7878\r\nUser-Agent: Test\r\n\r\n".as_slice(),
        ),
        (
            "complex",
            b"GET /users/edit/save/42?x=1 HTTP/1.1\r\n\
              Host: localhost:7878\r\n\
              User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64)\r\n\
              Accept: text/html,application/xhtml+xml\r\n\
              Accept-Encoding: gzip, deflate, br\r\n\
              Connection: keep-alive\r\n\
              \r\n"
                .as_slice(),
        ),
    ];

    for (name, request) in requests.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), request, |b, request| {
            b.iter(|| {
                let buffer = black_box(request.to_vec());
                let _ = Request::try_from(&buffer, 0).unwrap();
            });
        });
    }

    group.finish();
}

fn normalize_benchmark(c: &mut Criterion) {
    c.bench_function("normalize", |b| {
        b.iter(|| normalize(black_box("//Very/Long//Path/to/Some/Resource/?param1=value1#top")));
    });
}

fn route_resolve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_resolve");
    let registry = registry();

    let paths = [
        ("root", "/"),
        ("named_action", "/users/edit/save/42"),
        ("deep_group", "/section19/edit/show-all/a/b/c"),
        ("fallback", "/unknown/path/with/many/segments"),
    ];

    for (name, path) in paths.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), path, |b, path| {
            b.iter(|| Router::resolve(&registry, black_box(path)));
        });
    }

    group.finish();
}

fn assemble_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");
    let lang = Lang::default();

    for (name, debug) in [("debug", true), ("production", false)] {
        let config = Config::new().with_debug(debug);
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut doc = OutputDocument::new(&config, &lang, "");
                doc.set_title("Benchmark");
                for i in 0..10 {
                    doc.set_script(&format!("widgets/w{}.js", i));
                    doc.set_style(&format!("theme{}.css", i));
                }
                doc.set_inline_script("console.log(1);");
                doc.assemble(black_box("<main><p>body</p></main>"))
            });
        });
    }

    group.finish();
}

fn minify_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("minify");

    for repeat in [10, 100, 1000].iter() {
        let html = "<div>\n    <p>text   here</p>\n    <pre>  keep  </pre>\n</div>\n".repeat(*repeat);
        group.bench_with_input(BenchmarkId::from_parameter(repeat), &html, |b, html| {
            b.iter(|| minify(black_box(html)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    request_parse_benchmark,
    normalize_benchmark,
    route_resolve_benchmark,
    assemble_benchmark,
    minify_benchmark
);
criterion_main!(benches);
