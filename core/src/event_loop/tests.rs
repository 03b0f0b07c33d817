use super::*;
use crate::interpreter::{Settlement, Val};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Running {
    handle: LoopHandle,
    cancel: CancellationToken,
    thread: JoinHandle<Result<(), LoopError>>,
}

impl Running {
    fn join(self) -> Result<(), LoopError> {
        self.thread.join().expect("loop thread panicked")
    }

    fn stop(self) -> Result<(), LoopError> {
        self.cancel.cancel();
        self.join()
    }
}

fn start(lp: Loop) -> Running {
    let handle = lp.handle();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let thread = thread::Builder::new()
        .stack_size(16 * 1024 * 1024)
        .spawn(move || lp.run_blocking(token))
        .expect("spawn loop thread");
    Running {
        handle,
        cancel,
        thread,
    }
}

fn start_with(source: &str) -> Running {
    let mut vm = Vm::with_max_call_depth(50);
    vm.eval(source).expect("setup script failed");
    start(Loop::new(vm))
}

const RECORDER: &str = "let log = []; function rec(x) { log.push(x) }";

async fn log_of(handle: &LoopHandle) -> Val {
    handle.submit(Task::get_global("log")).wait().await.unwrap()
}

fn strs(items: &[&str]) -> Val {
    Val::List(items.iter().map(|s| Val::Str(s.to_string())).collect())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_submit_returns_value() {
    let running = start_with("");
    let result = running.handle.submit(Task::eval("1 + 2")).wait().await;
    assert_eq!(result, Ok(Val::Num(3.0)));
    assert_eq!(running.stop(), Err(LoopError::Cancelled));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ready_order_is_run_order() {
    let running = start_with(RECORDER);
    let handle = &running.handle;

    let a = handle.add(Task::call("rec", vec![Val::Str("a".into())]));
    let b = handle.add(Task::call("rec", vec![Val::Str("b".into())]));
    let c = handle.add(Task::call("rec", vec![Val::Str("c".into())]));

    // readiness order wins over insertion order
    let done_c = handle.ready(c);
    let done_a = handle.ready(a);
    let done_b = handle.ready(b);
    done_b.wait().await.unwrap();
    done_a.wait().await.unwrap();
    done_c.wait().await.unwrap();

    assert_eq!(log_of(handle).await, strs(&["c", "a", "b"]));
    assert_eq!(running.stop(), Err(LoopError::Cancelled));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exception_goes_to_caller_and_loop_continues() {
    let running = start_with("");
    let result = running
        .handle
        .submit(Task::eval("throw Error('nope')"))
        .wait()
        .await;
    match result {
        Err(CallError::Exception(Val::Error(info))) => assert_eq!(info.message, "nope"),
        other => panic!("expected an exception, got {:?}", other),
    }

    let result = running.handle.submit(Task::eval("'still here'")).wait().await;
    assert_eq!(result, Ok(Val::Str("still here".into())));
    assert_eq!(running.stop(), Err(LoopError::Cancelled));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unawaited_exception_is_logged_not_fatal() {
    let running = start_with("");
    running.handle.post(Task::eval("throw 'ignored'"));
    let result = running.handle.submit(Task::eval("2")).wait().await;
    assert_eq!(result, Ok(Val::Num(2.0)));
    assert_eq!(running.stop(), Err(LoopError::Cancelled));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_global_callee() {
    let running = start_with("");
    let result = running.handle.submit(Task::call("nothing", vec![])).wait().await;
    match result {
        Err(CallError::Exception(Val::Error(info))) => assert_eq!(info.name, "ReferenceError"),
        other => panic!("expected a ReferenceError, got {:?}", other),
    }
    assert_eq!(running.stop(), Err(LoopError::Cancelled));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fault_stops_loop() {
    let running = start_with("function f() { return f() }");
    let result = running.handle.submit(Task::call("f", vec![])).wait().await;
    assert!(matches!(result, Err(CallError::Fatal(_))));

    let handle = running.handle.clone();
    assert_eq!(
        running.join(),
        Err(LoopError::Fatal(Fault::CallDepthExceeded { limit: 50 }))
    );
    assert!(handle.is_closed());
    let late = handle.submit(Task::eval("1")).wait().await;
    assert_eq!(late, Err(CallError::LoopStopped));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_host_panic_is_fatal() {
    let mut vm = Vm::new();
    vm.define_native("boom", |_vm, _args| panic!("kaboom"))
        .unwrap();
    let running = start(Loop::new(vm));

    let result = running.handle.submit(Task::eval("boom()")).wait().await;
    assert!(matches!(result, Err(CallError::Fatal(_))));
    assert_eq!(
        running.join(),
        Err(LoopError::Fatal(Fault::HostPanic("kaboom".into())))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_releases_waiters() {
    let running = start_with("");
    let handle = running.handle.clone();
    let pending = handle.add(Task::eval("1"));

    assert_eq!(running.stop(), Err(LoopError::Cancelled));
    assert_eq!(handle.ready(pending).wait().await, Err(CallError::LoopStopped));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timers_run_in_deadline_order() {
    let running = start_with(RECORDER);
    let handle = &running.handle;
    let rec = handle.submit(Task::get_global("rec")).wait().await.unwrap();

    handle.add(Task::timeout(
        rec.clone(),
        vec![Val::Str("late".into())],
        Duration::from_millis(40),
    ));
    handle.add(Task::timeout(
        rec.clone(),
        vec![Val::Str("early".into())],
        Duration::from_millis(10),
    ));
    let now = handle.submit(Task::call(rec, vec![Val::Str("now".into())]));
    now.wait().await.unwrap();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(log_of(handle).await, strs(&["now", "early", "late"]));
    assert_eq!(running.stop(), Err(LoopError::Cancelled));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_interval_repeats_until_cleared() {
    let running = start_with("let n = 0; function tick() { n += 1 }");
    let handle = &running.handle;
    let tick = handle.submit(Task::get_global("tick")).wait().await.unwrap();

    let id = handle.add(Task::interval(tick, vec![], Duration::from_millis(10)));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(handle.clear(id));
    let fired = handle.submit(Task::get_global("n")).wait().await.unwrap();
    let fired = fired.to_number();
    assert!(fired >= 2.0, "interval fired {} times", fired);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = handle.submit(Task::get_global("n")).wait().await.unwrap();
    assert_eq!(after.to_number(), fired);
    assert!(!handle.clear(id));
    assert_eq!(running.stop(), Err(LoopError::Cancelled));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_promise_jobs_run_as_tasks() {
    let running = start_with("");
    running
        .handle
        .submit(Task::eval("let out; Promise.resolve(5).then(v => { out = v * 2 })"))
        .wait()
        .await
        .unwrap();
    let out = running
        .handle
        .submit(Task::get_global("out"))
        .wait()
        .await
        .unwrap();
    assert_eq!(out, Val::Num(10.0));
    assert_eq!(running.stop(), Err(LoopError::Cancelled));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_settle_task_resolves_promise() {
    let mut vm = Vm::new();
    let promise = vm.create_promise();
    vm.set_global("p", Val::Promise(promise));
    vm.eval("let got; p.then(v => { got = v })").unwrap();
    let running = start(Loop::new(vm));

    running.handle.post(Task::io_completion(TaskBody::Settle {
        promise,
        settlement: Settlement::Fulfilled(Val::Str("io".into())),
    }));
    // let the settle task run and queue its reaction
    tokio::time::sleep(Duration::from_millis(20)).await;
    let got = running
        .handle
        .submit(Task::get_global("got"))
        .wait()
        .await
        .unwrap();
    assert_eq!(got, Val::Str("io".into()));
    assert_eq!(running.stop(), Err(LoopError::Cancelled));
}

#[test]
fn test_wait_blocking_from_plain_thread() {
    let running = start_with("");
    let result = running.handle.submit(Task::eval("'sync'")).wait_blocking();
    assert_eq!(result, Ok(Val::Str("sync".into())));
    assert_eq!(running.stop(), Err(LoopError::Cancelled));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_promise_sweep_keeps_reachable_promises() {
    let mut vm = Vm::new();
    let pending = vm.create_promise();
    vm.set_global("pending", Val::Promise(pending));
    let running = start(Loop::new(vm));
    let handle = &running.handle;

    let setup = r#"
        let kept = Promise.resolve('kept');
        let got = [];
        for (let i = 0; i < 600; i++) { Promise.resolve(i).then(v => v) }
        pending.then(v => got.push(v));
    "#;
    handle.submit(Task::eval(setup)).wait().await.unwrap();
    // a later task runs after the sweep triggered by the reactions above
    handle.submit(Task::eval("kept.then(v => got.push(v))")).wait().await.unwrap();

    handle.post(Task::io_completion(TaskBody::Settle {
        promise: pending,
        settlement: Settlement::Fulfilled(Val::Str("late".into())),
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let got = handle.submit(Task::get_global("got")).wait().await.unwrap();
    assert_eq!(got, strs(&["kept", "late"]));
    assert_eq!(running.stop(), Err(LoopError::Cancelled));
}
