//! End-to-end tests: the real host, a real child process, and the real
//! framed protocol, with `sasspipe-mockc` standing in for Dart Sass.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sasspipe::{
    Args, Error, Import, ImportResolver, LogEvent, LogEventKind, Options, OutputStyle,
    ResolverError, SourceSyntax, Transpiler,
};

fn mock_options() -> Options {
    Options {
        filename: env!("CARGO_BIN_EXE_sasspipe-mockc").to_string(),
        ..Options::default()
    }
}

fn start_mock() -> Transpiler {
    Transpiler::start(mock_options()).expect("mock compiler should start")
}

#[derive(Clone)]
struct TestResolver {
    name: String,
    content: String,
    source_syntax: SourceSyntax,
    fail_on_canonicalize: bool,
    fail_on_load: bool,
}

impl TestResolver {
    fn new(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            content: content.to_string(),
            source_syntax: SourceSyntax::Scss,
            fail_on_canonicalize: false,
            fail_on_load: false,
        }
    }
}

impl ImportResolver for TestResolver {
    fn canonicalize(&self, url: &str) -> Result<Option<String>, ResolverError> {
        if self.fail_on_canonicalize {
            return Err("failed".into());
        }
        if url != self.name {
            return Ok(None);
        }
        Ok(Some(format!("file:/my{}/scss/{url}_myfile.scss", self.name)))
    }

    fn load(&self, url: &str) -> Result<Import, ResolverError> {
        if self.fail_on_load {
            return Err("failed".into());
        }
        assert!(url.contains(&self.name), "load of unexpected url {url}");
        Ok(Import {
            content: self.content.clone(),
            source_syntax: self.source_syntax,
        })
    }
}

#[test]
fn output_style_compressed() {
    let transpiler = start_mock();
    let result = transpiler
        .execute(Args {
            source: "div { color: #ccc; }".to_string(),
            output_style: OutputStyle::Compressed,
            ..Args::default()
        })
        .unwrap();
    assert_eq!(result.css, "div{color:#ccc}");
    transpiler.close().unwrap();
}

#[test]
fn indented_syntax() {
    let transpiler = start_mock();
    let source = "$font-stack:    Helvetica, sans-serif\n$primary-color: #333\n\nbody\n  font: 100% $font-stack\n  color: $primary-color\n";
    let result = transpiler
        .execute(Args {
            source: source.to_string(),
            source_syntax: SourceSyntax::Indented,
            output_style: OutputStyle::Compressed,
            ..Args::default()
        })
        .unwrap();
    assert_eq!(result.css, "body{font:100% Helvetica,sans-serif;color:#333}");
    transpiler.close().unwrap();
}

#[test]
fn import_resolver_roundtrip() {
    let transpiler = start_mock();
    let result = transpiler
        .execute(Args {
            source: "@import \"colors\";\ndiv { p { color: $white; } }".to_string(),
            import_resolver: Some(Arc::new(TestResolver::new("colors", "$white:    #ffff"))),
            ..Args::default()
        })
        .unwrap();
    assert_eq!(result.css, "div p {\n  color: #ffff;\n}");
    transpiler.close().unwrap();
}

#[test]
fn import_resolver_with_indented_content() {
    let transpiler = start_mock();
    let mut resolver = TestResolver::new("main", "\n#main\n    color: blue\n");
    resolver.source_syntax = SourceSyntax::Indented;
    let result = transpiler
        .execute(Args {
            source: "@import \"main\";\n".to_string(),
            import_resolver: Some(Arc::new(resolver)),
            ..Args::default()
        })
        .unwrap();
    assert_eq!(result.css, "#main {\n  color: blue;\n}");
    transpiler.close().unwrap();
}

#[test]
fn include_paths_resolve_partials_in_order() {
    let dir1 = tempfile::tempdir().unwrap();
    let dir2 = tempfile::tempdir().unwrap();
    std::fs::write(dir1.path().join("_colors.scss"), "\n$moo:       #f442d1 !default;\n")
        .unwrap();
    std::fs::write(dir2.path().join("_content.scss"), "\ncontent { color: #ccc; }\n").unwrap();

    let transpiler = start_mock();
    let result = transpiler
        .execute(Args {
            source: "@import \"colors\";\n@import \"content\";\ndiv { p { color: $moo; } }"
                .to_string(),
            output_style: OutputStyle::Compressed,
            include_paths: vec![dir1.path().to_path_buf(), dir2.path().to_path_buf()],
            ..Args::default()
        })
        .unwrap();
    assert_eq!(result.css, "content{color:#ccc}div p{color:#f442d1}");
    transpiler.close().unwrap();
}

#[test]
fn compile_failures_do_not_poison_the_transpiler() {
    let transpiler = start_mock();

    let first = transpiler
        .execute(Args {
            source: "@error \"foo\";".to_string(),
            ..Args::default()
        })
        .unwrap_err();
    let message = match &first {
        Error::Compile(err) => err.message.clone(),
        other => panic!("expected a compile error, got {other}"),
    };
    assert_eq!(message, "foo");

    // The connection must still be up and running.
    let second = transpiler
        .execute(Args {
            source: "@error \"foo\";".to_string(),
            ..Args::default()
        })
        .unwrap_err();
    assert_eq!(second.to_string(), first.to_string());

    let result = transpiler
        .execute(Args {
            source: "div { color: #ccc; }".to_string(),
            output_style: OutputStyle::Compressed,
            ..Args::default()
        })
        .unwrap();
    assert_eq!(result.css, "div{color:#ccc}");
    transpiler.close().unwrap();
}

#[test]
fn undefined_variable_is_a_compile_error() {
    let transpiler = start_mock();
    let err = transpiler
        .execute(Args {
            source: "div { color: $white; }".to_string(),
            ..Args::default()
        })
        .unwrap_err();
    match err {
        Error::Compile(compile) => {
            assert!(compile.message.contains("Undefined variable"), "{compile}")
        }
        other => panic!("expected a compile error, got {other}"),
    }
    transpiler.close().unwrap();
}

#[test]
fn import_not_found_is_a_compile_error() {
    let transpiler = start_mock();
    for resolver in [
        None,
        Some(Arc::new(TestResolver::new("colors", "$white: #ffff;")) as Arc<dyn ImportResolver>),
    ] {
        let err = transpiler
            .execute(Args {
                source: "@import \"foo\";".to_string(),
                import_resolver: resolver,
                ..Args::default()
            })
            .unwrap_err();
        assert!(
            matches!(&err, Error::Compile(compile) if compile.message.contains("Can't find stylesheet")),
            "got: {err}"
        );
    }
    transpiler.close().unwrap();
}

#[test]
fn resolver_errors_surface_as_compile_errors() {
    let transpiler = start_mock();

    let mut failing = TestResolver::new("colors", "");
    failing.fail_on_canonicalize = true;
    let err = transpiler
        .execute(Args {
            source: "@import \"colors\";".to_string(),
            import_resolver: Some(Arc::new(failing)),
            ..Args::default()
        })
        .unwrap_err();
    assert!(
        matches!(&err, Error::Compile(compile) if compile.message == "failed"),
        "got: {err}"
    );

    let mut failing = TestResolver::new("colors", "");
    failing.fail_on_load = true;
    let err = transpiler
        .execute(Args {
            source: "@import \"colors\";".to_string(),
            import_resolver: Some(Arc::new(failing)),
            ..Args::default()
        })
        .unwrap_err();
    assert!(
        matches!(&err, Error::Compile(compile) if compile.message == "failed"),
        "got: {err}"
    );

    transpiler.close().unwrap();
}

#[test]
fn source_map_generation() {
    let transpiler = start_mock();

    let plain = transpiler
        .execute(Args {
            source: "div{color:blue;}".to_string(),
            url: "file://myproject/main.scss".to_string(),
            output_style: OutputStyle::Compressed,
            ..Args::default()
        })
        .unwrap();
    assert_eq!(plain.source_map, "");

    let mapped = transpiler
        .execute(Args {
            source: "div{color:blue;}".to_string(),
            url: "file://myproject/main.scss".to_string(),
            output_style: OutputStyle::Compressed,
            enable_source_map: true,
            ..Args::default()
        })
        .unwrap();
    assert!(mapped.source_map.contains("\"version\":3"), "{}", mapped.source_map);
    assert!(
        mapped.source_map.contains("file://myproject/main.scss"),
        "{}",
        mapped.source_map
    );
    assert!(!mapped.source_map.contains("sourcesContent"));

    let with_sources = transpiler
        .execute(Args {
            source: "div{color:blue;}".to_string(),
            url: "file://myproject/main.scss".to_string(),
            output_style: OutputStyle::Compressed,
            enable_source_map: true,
            source_map_include_sources: true,
            ..Args::default()
        })
        .unwrap();
    assert!(
        with_sources.source_map.contains("sourcesContent"),
        "{}",
        with_sources.source_map
    );
    assert!(
        with_sources.source_map.contains("div{color:blue;}"),
        "{}",
        with_sources.source_map
    );

    transpiler.close().unwrap();
}

#[test]
fn log_events_are_delivered_to_the_sink() {
    let events: Arc<Mutex<Vec<LogEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let transpiler = Transpiler::start(Options {
        log_events: Some(Box::new(move |event| sink.lock().unwrap().push(event))),
        ..mock_options()
    })
    .unwrap();

    let result = transpiler
        .execute(Args {
            source: "$color: #333;\nbody { color: $color; }\n@debug \"foo\";\n@warn \"bar\";\n"
                .to_string(),
            ..Args::default()
        })
        .unwrap();
    assert_eq!(result.css, "body {\n  color: #333;\n}");

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, LogEventKind::Debug);
    assert_eq!(events[0].message, "stdin:2:0: foo");
    assert_eq!(events[1].kind, LogEventKind::Warning);
    assert_eq!(events[1].message, "bar");
    drop(events);

    transpiler.close().unwrap();
}

#[test]
fn silence_deprecations_suppresses_named_kinds() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("_colors.scss"), "$moo: #f442d1 !default;\n").unwrap();

    for (silence, expect_deprecation) in [(vec![], true), (vec!["import".to_string()], false)] {
        let events: Arc<Mutex<Vec<LogEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let transpiler = Transpiler::start(Options {
            log_events: Some(Box::new(move |event| sink.lock().unwrap().push(event))),
            ..mock_options()
        })
        .unwrap();

        let result = transpiler
            .execute(Args {
                source: "@import \"colors\";\ndiv { p { color: $moo; } }".to_string(),
                output_style: OutputStyle::Compressed,
                include_paths: vec![dir.path().to_path_buf()],
                silence_deprecations: silence,
                ..Args::default()
            })
            .unwrap();
        assert_eq!(result.css, "div p{color:#f442d1}");

        let logged_import_deprecation = events
            .lock()
            .unwrap()
            .iter()
            .any(|event| event.deprecation_type.as_deref() == Some("import"));
        assert_eq!(logged_import_deprecation, expect_deprecation);

        transpiler.close().unwrap();
    }
}

#[test]
fn silence_dependency_deprecations_only_quiets_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("_outer.scss"),
        "@import \"inner\";\ncontent { color: #ccc; }\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("_inner.scss"), "$moo: #f442d1;\n").unwrap();

    for (quiet_deps, expected_deprecations) in [(false, 2), (true, 1)] {
        let events: Arc<Mutex<Vec<LogEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let transpiler = Transpiler::start(Options {
            log_events: Some(Box::new(move |event| sink.lock().unwrap().push(event))),
            ..mock_options()
        })
        .unwrap();

        let result = transpiler
            .execute(Args {
                source: "@import \"outer\";\ndiv { p { color: $moo; } }".to_string(),
                output_style: OutputStyle::Compressed,
                include_paths: vec![dir.path().to_path_buf()],
                silence_dependency_deprecations: quiet_deps,
                ..Args::default()
            })
            .unwrap();
        assert_eq!(result.css, "content{color:#ccc}div p{color:#f442d1}");

        let deprecations = events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.kind == LogEventKind::DeprecationWarning)
            .count();
        assert_eq!(deprecations, expected_deprecations);

        transpiler.close().unwrap();
    }
}

#[test]
fn parallel_executes_route_results_exactly() {
    let transpiler = Arc::new(start_mock());
    let mut handles = Vec::new();

    for num in 0..20 {
        let transpiler = Arc::clone(&transpiler);
        handles.push(thread::spawn(move || {
            for _ in 0..8 {
                let source =
                    format!("$primary-color: #{num:03};\n\ndiv {{ color: $primary-color; }}");
                let result = transpiler.execute(Args {
                    source,
                    ..Args::default()
                });
                let result = result.unwrap();
                assert_eq!(result.css, format!("div {{\n  color: #{num:03};\n}}"));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    Arc::try_unwrap(transpiler)
        .map_err(|_| "transpiler still shared")
        .unwrap()
        .close()
        .unwrap();
}

#[test]
fn parallel_executes_with_import_resolvers() {
    let transpiler = Arc::new(start_mock());
    let mut handles = Vec::new();

    for thread_num in 0..8 {
        let transpiler = Arc::clone(&transpiler);
        handles.push(thread::spawn(move || {
            for width in 0..5 {
                for _ in 0..4 {
                    let width = thread_num + width;
                    let resolver =
                        TestResolver::new("widths", &format!("$width:  {width}"));
                    let result = transpiler
                        .execute(Args {
                            source: "@import \"widths\";\n\ndiv { p { width: $width; } }"
                                .to_string(),
                            output_style: OutputStyle::Compressed,
                            import_resolver: Some(Arc::new(resolver)),
                            ..Args::default()
                        })
                        .unwrap();
                    assert_eq!(result.css, format!("div p{{width:{width}}}"));
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    Arc::try_unwrap(transpiler)
        .map_err(|_| "transpiler still shared")
        .unwrap()
        .close()
        .unwrap();
}

#[test]
fn close_races_with_in_flight_executes() {
    let transpiler = Arc::new(start_mock());
    let mut handles = Vec::new();

    for num in 0..10 {
        let transpiler = Arc::clone(&transpiler);
        handles.push(thread::spawn(move || {
            for iteration in 0..4 {
                if num + iteration == 10 {
                    if let Err(err) = transpiler.close() {
                        assert!(matches!(err, Error::Shutdown), "close: {err}");
                    }
                }

                let source = format!("$primary-color: #{num:03};\n\ndiv {{ color: $primary-color; }}");
                match transpiler.execute(Args {
                    source,
                    ..Args::default()
                }) {
                    Ok(result) => {
                        assert_eq!(result.css, format!("div {{\n  color: #{num:03};\n}}"));
                    }
                    Err(err) => assert!(matches!(err, Error::Shutdown), "execute: {err}"),
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // The reader thread finishes the drain on its own schedule.
    for _ in 0..200 {
        if transpiler.is_shut_down() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("pending calls were not drained after close");
}

#[test]
fn close_drains_pending_calls_when_the_compiler_ignores_eof() {
    let transpiler = Arc::new(start_mock());

    let worker = {
        let transpiler = Arc::clone(&transpiler);
        thread::spawn(move || {
            transpiler.execute(Args {
                source: "@mock-ignore-eof;".to_string(),
                ..Args::default()
            })
        })
    };
    // Let the request reach the compiler before closing.
    thread::sleep(Duration::from_millis(200));

    // The mock neither answers nor exits on EOF, so the bounded wait fires;
    // closing the reader half still drains the pending call.
    let err = transpiler.close().unwrap_err();
    assert!(matches!(err, Error::WaitTimeout), "close: {err}");

    let outcome = worker.join().unwrap();
    assert!(
        matches!(outcome, Err(Error::Shutdown)),
        "pending call: {outcome:?}"
    );

    for _ in 0..200 {
        if transpiler.is_shut_down() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("pending calls were not drained after close");
}

#[test]
fn close_twice_returns_shutdown() {
    let transpiler = start_mock();
    transpiler.close().unwrap();
    assert!(matches!(transpiler.close(), Err(Error::Shutdown)));
}

#[test]
fn execute_after_close_returns_shutdown() {
    let transpiler = start_mock();
    transpiler.close().unwrap();
    let err = transpiler
        .execute(Args {
            source: "div { color: #ccc; }".to_string(),
            ..Args::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::Shutdown));
}

#[test]
fn compiler_eof_fails_pending_and_later_executes() {
    let transpiler = start_mock();
    let err = transpiler
        .execute(Args {
            source: "@mock-exit;".to_string(),
            ..Args::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::UnexpectedEof), "got: {err}");

    let err = transpiler
        .execute(Args {
            source: "div { color: #ccc; }".to_string(),
            ..Args::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::Shutdown), "got: {err}");

    transpiler.close().unwrap();
}

#[test]
fn deadline_fires_when_the_compiler_stalls() {
    let transpiler = Transpiler::start(Options {
        timeout: Some(Duration::from_millis(300)),
        ..mock_options()
    })
    .unwrap();

    let err = transpiler
        .execute(Args {
            source: "@mock-hang;".to_string(),
            ..Args::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got: {err}");

    // The mock swallowed that compilation but keeps serving.
    let result = transpiler
        .execute(Args {
            source: "div { color: #ccc; }".to_string(),
            output_style: OutputStyle::Compressed,
            ..Args::default()
        })
        .unwrap();
    assert_eq!(result.css, "div{color:#ccc}");

    transpiler.close().unwrap();
}

#[test]
fn unknown_compilation_id_kills_the_connection() {
    let transpiler = start_mock();
    let err = transpiler
        .execute(Args {
            source: "@mock-bogus-id;".to_string(),
            ..Args::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::UnknownId(_)), "got: {err}");

    let err = transpiler
        .execute(Args {
            source: "div { color: #ccc; }".to_string(),
            ..Args::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::Shutdown), "got: {err}");
}

#[test]
fn compiler_protocol_errors_are_fatal() {
    let transpiler = start_mock();
    let err = transpiler
        .execute(Args {
            source: "@mock-protocol-error;".to_string(),
            ..Args::default()
        })
        .unwrap_err();
    assert!(
        matches!(&err, Error::Protocol(message) if message.contains("mock protocol failure")),
        "got: {err}"
    );

    let err = transpiler
        .execute(Args {
            source: "div { color: #ccc; }".to_string(),
            ..Args::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::Shutdown), "got: {err}");
}
