use criterion::{criterion_group, criterion_main, Criterion};
use mapscript_config::ScriptConfig;
use mapscript_core::{ActorId, EntityId, MapPosition, Tick, TimerId};
use mapscript_scripting::{ActorInfo, ExecutionState, Host, InputKind, Param, ScriptEngine, TimerQueue};
use std::hint::black_box;

/// Host with no world behind it
#[derive(Default)]
struct BenchHost {
    timers: TimerQueue<Box<ExecutionState>>,
}

impl Host for BenchHost {
    fn now(&self) -> Tick {
        Tick(0)
    }
    fn actor(&self, _actor: ActorId) -> Option<ActorInfo> {
        None
    }
    fn entity_position(&self, _entity: EntityId) -> Option<MapPosition> {
        None
    }
    fn show_text(&mut self, _actor: ActorId, _owner: EntityId, _text: &str) {}
    fn show_next(&mut self, _actor: ActorId, _owner: EntityId) {}
    fn show_close(&mut self, _actor: ActorId, _owner: EntityId) {}
    fn open_menu(&mut self, _actor: ActorId, _owner: EntityId, _options: &[String]) {}
    fn open_input(&mut self, _actor: ActorId, _owner: EntityId, _kind: InputKind) {}
    fn end_dialog(&mut self, _actor: ActorId, _owner: EntityId) {}
    fn read_attribute(&self, _actor: ActorId, _param: Param) -> i64 {
        0
    }
    fn write_attribute(&mut self, _actor: ActorId, _param: Param, _value: i64) -> bool {
        false
    }
    fn schedule_timer(&mut self, wake_at: Tick, state: Box<ExecutionState>) -> TimerId {
        self.timers.schedule(wake_at, state)
    }
    fn cancel_timer(&mut self, timer: TimerId) -> Option<Box<ExecutionState>> {
        self.timers.cancel(timer)
    }
}

fn vm_loop_bench(c: &mut Criterion) {
    let config = ScriptConfig {
        check_cmdcount: 0,
        check_gotocount: 0,
        ..ScriptConfig::default()
    };
    let mut engine = ScriptEngine::new(config);
    let mut host = BenchHost::default();

    let counting = engine
        .compile("count", "{ .@i = 0; while (.@i < 10000) { .@i += 1; } return .@i; }")
        .unwrap();
    c.bench_function("while_10k", |b| {
        b.iter(|| {
            let out = engine.run(&mut host, counting, 0, ActorId::NONE, EntityId(1)).unwrap();
            black_box(out);
        })
    });

    let calls = engine
        .compile(
            "calls",
            "{ function Fib; return Fib(15); function Fib { if (getarg(0) < 2) return getarg(0); return Fib(getarg(0) - 1) + Fib(getarg(0) - 2); } }",
        )
        .unwrap();
    c.bench_function("fib_15", |b| {
        b.iter(|| {
            let out = engine.run(&mut host, calls, 0, ActorId::NONE, EntityId(1)).unwrap();
            black_box(out);
        })
    });

    let strings = engine
        .compile(
            "strings",
            "{ for (.@i = 0; .@i < 500; .@i++) { .@s$ = .@s$ + \"x\"; } return strlen(.@s$); }",
        )
        .unwrap();
    c.bench_function("concat_500", |b| {
        b.iter(|| {
            let out = engine.run(&mut host, strings, 0, ActorId::NONE, EntityId(1)).unwrap();
            black_box(out);
        })
    });
}

criterion_group!(benches, vm_loop_bench);
criterion_main!(benches);
