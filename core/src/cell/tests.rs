use super::*;
use crate::bindings::{FetchError, FetchRequest, FetchResponse};
use crate::bindings::fetch::FetchCallback;
use crate::interpreter::Fault;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Answers every request after a short delay, from its own thread
struct StubFetcher {
    outcome: Result<FetchResponse, FetchError>,
}

impl StubFetcher {
    fn ok(body: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(FetchResponse {
                url: String::new(),
                status: 200,
                status_text: "OK".into(),
                headers: BTreeMap::new(),
                body: body.into(),
            }),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(FetchError::Transport("connection refused".into())),
        })
    }
}

impl Fetcher for StubFetcher {
    fn fetch(&self, request: FetchRequest, done: FetchCallback) {
        let outcome = self.outcome.clone().map(|mut response| {
            response.url = request.url;
            response
        });
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            done(outcome);
        });
    }
}

fn strs(items: &[&str]) -> Val {
    Val::List(items.iter().map(|s| Val::Str(s.to_string())).collect())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_idle_cell_stops_promptly() {
    let cell = Cell::new("idle").unwrap();
    assert_eq!(cell.id(), "idle");
    assert_eq!(cell.state(), CellState::Running);

    let started = Instant::now();
    cell.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(cell.state(), CellState::Stopped);

    // repeated stop returns at once
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_zero_delay_timeout_is_never_inline() {
    let cell = Cell::new("zero-delay").unwrap();
    let source = r#"
        let order = []
        setTimeout(() => order.push('timer'), 0)
        order.push('sync')
        order.length
    "#;
    assert_eq!(cell.run_script(source).await.unwrap(), Val::Num(1.0));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cell.get("order").await.unwrap(), strs(&["sync", "timer"]));
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timer_arguments_are_passed() {
    let cell = Cell::new("timer-args").unwrap();
    cell.run_script("let got; setTimeout((a, b) => { got = a + b }, 5, 2, 3)")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cell.get("got").await.unwrap(), Val::Num(5.0));
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_interval_spacing_at_least_period() {
    let cell = Cell::new("interval").unwrap();
    let source = r#"
        let stamps = []
        let handle = setInterval(() => {
            stamps.push(Date.now())
            if (stamps.length == 4) clearInterval(handle)
        }, 30)
    "#;
    cell.run_script(source).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let Val::List(stamps) = cell.get("stamps").await.unwrap() else {
        panic!("stamps is not a list");
    };
    assert_eq!(stamps.len(), 4);
    for pair in stamps.windows(2) {
        let gap = pair[1].to_number() - pair[0].to_number();
        // Date.now() has millisecond resolution
        assert!(gap >= 29.0, "interval fired after {} ms", gap);
    }
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_clearing_unknown_or_fired_ids_is_harmless() {
    let cell = Cell::new("clear").unwrap();
    cell.run_script("let fired = 0; let t = setTimeout(() => { fired += 1 }, 0)")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let source = "clearTimeout(t); clearInterval(t); clearTimeout(9999); clearInterval(); fired";
    assert_eq!(cell.run_script(source).await.unwrap(), Val::Num(1.0));
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cleared_timeout_never_fires() {
    let cell = Cell::new("cleared").unwrap();
    cell.run_script("let fired = false; let t = setTimeout(() => { fired = true }, 20); clearTimeout(t)")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cell.get("fired").await.unwrap(), Val::Bool(false));
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_throwing_call_leaves_loop_usable() {
    let cell = Cell::new("throwing").unwrap();
    cell.run_script("function bad() { throw Error('bad') } function good(x) { return x * 2 }")
        .await
        .unwrap();

    match cell.call_async("bad", vec![]).await {
        Err(CallError::Exception(Val::Error(info))) => assert_eq!(info.message, "bad"),
        other => panic!("expected an exception, got {:?}", other),
    }
    let doubled = cell.call_async("good", vec![Val::Num(21.0)]).await;
    assert_eq!(doubled, Ok(Val::Num(42.0)));
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_calls_run_in_ready_order() {
    let cell = Cell::new("order").unwrap();
    cell.run_script("let log = []; function rec(x) { log.push(x) }")
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        cell.call_async("rec", vec![Val::Str("a".into())]),
        cell.call_async("rec", vec![Val::Str("b".into())]),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(cell.get("log").await.unwrap(), strs(&["a", "b"]));
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_with_function_value() {
    let cell = Cell::new("value").unwrap();
    let add = cell.run_script("(a, b) => a + b").await.unwrap();
    let sum = cell
        .call_async(add, vec![Val::Num(1.0), Val::Num(2.0)])
        .await;
    assert_eq!(sum, Ok(Val::Num(3.0)));
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_prevents_pending_timer() {
    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();
    let cell = Cell::builder("pending-timer")
        .setup(move |vm| {
            vm.define_native("mark", move |_vm, _args| {
                flag.store(true, Ordering::SeqCst);
                Ok(Val::Undefined)
            })
            .expect("define mark");
        })
        .build()
        .unwrap();

    cell.run_script("setTimeout(mark, 50)").await.unwrap();
    cell.stop().await.unwrap();
    assert_eq!(cell.state(), CellState::Stopped);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!fired.load(Ordering::SeqCst));
    assert_eq!(cell.run_script("1").await, Err(CallError::LoopStopped));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_resolves_after_call_and_before_later_timer() {
    let cell = Cell::builder("fetch")
        .fetcher(StubFetcher::ok("hello"))
        .build()
        .unwrap();
    let source = r#"
        let log = []
        fetch('http://stub.test/greeting').then(r => log.push(r.status + ':' + r.body + ':' + r.url))
        setTimeout(() => log.push('timer'), 200)
        log.push('sync')
        log.length
    "#;
    assert_eq!(cell.run_script(source).await.unwrap(), Val::Num(1.0));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        cell.get("log").await.unwrap(),
        strs(&["sync", "200:hello:http://stub.test/greeting", "timer"])
    );
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_transport_failure_rejects() {
    let cell = Cell::builder("fetch-fail")
        .fetcher(StubFetcher::failing())
        .build()
        .unwrap();
    cell.run_script("let err; fetch('http://stub.test/').catch(e => { err = e.name + ': ' + e.message })")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        cell.get("err").await.unwrap(),
        Val::Str("TypeError: network request failed: connection refused".into())
    );
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_bad_url_rejects() {
    let cell = Cell::builder("fetch-url")
        .fetcher(StubFetcher::ok(""))
        .build()
        .unwrap();
    cell.run_script("let name; fetch(42).catch(e => { name = e.name })")
        .await
        .unwrap();
    assert_eq!(cell.get("name").await.unwrap(), Val::Str("TypeError".into()));
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_never_ending_task_times_out_stop() {
    let cell = Arc::new(Cell::new("spinner").unwrap());
    cell.run_script("function spin() { let end = Date.now() + 2500; while (Date.now() < end) {} }")
        .await
        .unwrap();

    let spinning = cell.clone();
    tokio::spawn(async move {
        let _ = spinning.call_async("spin", vec![]).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let result = cell.stop().await;
    let waited = started.elapsed();

    assert!(matches!(result, Err(CellError::StopTimeout(d)) if d == Duration::from_secs(1)));
    assert!(waited >= Duration::from_millis(900), "returned after {:?}", waited);
    assert!(waited < Duration::from_millis(2000), "returned after {:?}", waited);
    assert_eq!(cell.state(), CellState::Abandoned);

    // stopping again waits out the full bound again
    let again = Instant::now();
    let result = cell.stop().await;
    let waited = again.elapsed();
    assert!(matches!(result, Err(CellError::StopTimeout(_))));
    assert!(waited >= Duration::from_millis(900), "returned after {:?}", waited);
    assert!(waited < Duration::from_millis(1500), "returned after {:?}", waited);
    assert_eq!(cell.state(), CellState::Abandoned);

    // once the spin returns the loop notices the cancellation and exits
    let spin_over = started + Duration::from_millis(2800);
    tokio::time::sleep_until(spin_over.into()).await;
    cell.stop().await.unwrap();
    assert_eq!(cell.state(), CellState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fault_is_reported_by_stop() {
    let mut config = Config::default();
    config.cell.max_call_depth = 50;
    let cell = Cell::builder("fault").config(&config).build().unwrap();
    let result = cell.run_script("function f() { return f() } f()").await;
    assert!(matches!(result, Err(CallError::Fatal(_))));

    match cell.stop().await {
        Err(CellError::Loop(LoopError::Fatal(Fault::CallDepthExceeded { limit }))) => {
            assert_eq!(limit, 50)
        }
        other => panic!("expected a fatal loop error, got {:?}", other),
    }
    assert_eq!(cell.state(), CellState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_registration_failure_creates_no_cell() {
    let result = Cell::builder("dup")
        .bindings([Binding::Timers, Binding::Timers])
        .build();
    match result {
        Err(CellError::Registration(err)) => assert_eq!(err.binding, Binding::Timers),
        other => panic!("expected a registration error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bindings_can_be_limited() {
    let cell = Cell::builder("bare").bindings([]).build().unwrap();
    assert_eq!(
        cell.run_script("typeof setTimeout").await.unwrap(),
        Val::Str("undefined".into())
    );
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_and_set_globals() {
    let cell = Cell::new("globals").unwrap();
    cell.set("x", Val::Num(5.0)).await.unwrap();
    assert_eq!(cell.run_script("x * 2").await.unwrap(), Val::Num(10.0));
    assert_eq!(cell.get("missing").await.unwrap(), Val::Undefined);
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_blocking_from_blocking_thread() {
    let cell = Arc::new(Cell::new("blocking").unwrap());
    cell.run_script("function twice(x) { return x + x }").await.unwrap();

    let caller = cell.clone();
    let result = tokio::task::spawn_blocking(move || {
        caller.call_blocking("twice", vec![Val::Str("ab".into())])
    })
    .await
    .unwrap();
    assert_eq!(result, Ok(Val::Str("abab".into())));
    cell.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_custom_stop_timeout_from_config() {
    let mut config = Config::default();
    config.cell.stop_timeout_ms = 200;
    let cell = Cell::builder("short").config(&config).build().unwrap();
    cell.run_script("function spin() { let end = Date.now() + 600; while (Date.now() < end) {} }")
        .await
        .unwrap();

    let id = cell.handle.add(Task::call("spin", vec![]));
    let _pending = cell.handle.ready(id);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(
        cell.stop().await,
        Err(CellError::StopTimeout(d)) if d == Duration::from_millis(200)
    ));
}

#[test]
fn test_cell_usable_without_ambient_runtime() {
    let cell = Cell::new("plain-thread").unwrap();
    let answer = cell.call_blocking(Val::Num(1.0), vec![]);
    assert!(matches!(answer, Err(CallError::Exception(Val::Error(_)))));

    tokio_test::block_on(async {
        assert_eq!(cell.run_script("'still here'").await, Ok(Val::Str("still here".into())));
        cell.stop().await.unwrap();
    });
    assert_eq!(cell.state(), CellState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_oversized_list_index_leaves_cells_running() {
    let victim = Cell::new("victim").unwrap();
    let attacker = Cell::new("attacker").unwrap();
    victim.run_script("let count = 1").await.unwrap();

    for source in ["let a = []; a[1e12] = 1; a.length", "let b = []; b[1e300] = 1"] {
        match attacker.run_script(source).await {
            Err(CallError::Exception(Val::Error(info))) => assert_eq!(info.name, "RangeError"),
            other => panic!("expected a RangeError, got {:?}", other),
        }
    }

    assert_eq!(attacker.run_script("1").await, Ok(Val::Num(1.0)));
    assert_eq!(victim.run_script("count + 1").await, Ok(Val::Num(2.0)));
    attacker.stop().await.unwrap();
    victim.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deeply_nested_values_stay_serializable() {
    let cell = Cell::new("nesting").unwrap();
    let source = r#"
        let a = [];
        let caught = '';
        try { while (true) { a = [a] } } catch (e) { caught = e.name }
        JSON.stringify(a).length
    "#;
    // 512 brackets open and 512 close
    assert_eq!(cell.run_script(source).await, Ok(Val::Num(1024.0)));
    assert_eq!(cell.get("caught").await, Ok(Val::Str("RangeError".into())));
    assert_eq!(cell.run_script("typeof a").await, Ok(Val::Str("object".into())));
    cell.stop().await.unwrap();
}
