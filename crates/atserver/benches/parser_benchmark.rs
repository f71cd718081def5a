//! Throughput benchmarks for the line path.
//!
//! ## Running the benchmarks
//!
//! ```bash
//! cargo bench -p atserver
//! ```
//!
//! ## Benchmarks included
//!
//! - `framer/push_N` - Framing N lines of raw input
//! - `server/extended_read` - One `AT+CSQ?` line, end to end
//! - `server/chained_N` - One line with N chained sub-commands, end to end
//! - `server/basic_longest_match` - Basic-command prefix search

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use atserver::{AtServer, ClientId, DeviceRef, FinalResult, Invocation, LoopbackDevice, LoopbackHandle};
use atserver_protocol::LineFramer;

fn ok_handler(server: &mut AtServer, inv: Invocation) {
    let _ = server.send_final_response(inv.command, FinalResult::Ok, None);
}

fn server_with(names: &[&str]) -> (AtServer, DeviceRef, LoopbackHandle) {
    let mut server = AtServer::default();
    for name in names {
        let cmd = server.create_command(ClientId(1), name).unwrap();
        server.add_command_handler(cmd, ok_handler).unwrap();
    }
    let (device, handle) = LoopbackDevice::new();
    let dev = server.open(ClientId(1), Box::new(device)).unwrap();
    (server, dev, handle)
}

fn run_line(server: &mut AtServer, dev: DeviceRef, handle: &LoopbackHandle, line: &[u8]) {
    handle.feed(line);
    server.on_readable(dev).unwrap();
    server.run_pending();
    black_box(handle.take_output());
}

fn bench_framer(c: &mut Criterion) {
    let mut group = c.benchmark_group("framer");

    for lines in [1usize, 16, 128].iter() {
        let input: Vec<u8> = b"\r\nAT+CSQ=1,2,3\r".repeat(*lines);
        group.throughput(Throughput::Bytes(input.len() as u64));

        group.bench_with_input(BenchmarkId::new("push", lines), &input, |b, input| {
            let mut framer = LineFramer::new();
            b.iter(|| black_box(framer.push(black_box(input))));
        });
    }

    group.finish();
}

fn bench_server(c: &mut Criterion) {
    let mut group = c.benchmark_group("server");

    group.bench_function("extended_read", |b| {
        let (mut server, dev, handle) = server_with(&["AT+CSQ"]);
        b.iter(|| run_line(&mut server, dev, &handle, b"AT+CSQ?\r"));
    });

    for count in [2usize, 8, 16].iter() {
        let mut line = b"AT+FOO=1,2".to_vec();
        for _ in 1..*count {
            line.extend_from_slice(b";+FOO=1,2");
        }
        line.push(b'\r');
        group.throughput(Throughput::Elements(*count as u64));

        group.bench_with_input(BenchmarkId::new("chained", count), &line, |b, line| {
            let (mut server, dev, handle) = server_with(&["AT+FOO"]);
            b.iter(|| run_line(&mut server, dev, &handle, line));
        });
    }

    group.bench_function("basic_longest_match", |b| {
        let (mut server, dev, handle) = server_with(&["AT&K", "AT&K3", "ATE", "ATV", "ATI"]);
        b.iter(|| run_line(&mut server, dev, &handle, b"ATE0V1&K3I\r"));
    });

    group.finish();
}

criterion_group!(benches, bench_framer, bench_server);
criterion_main!(benches);
