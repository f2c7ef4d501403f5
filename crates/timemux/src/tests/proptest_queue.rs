//! Random schedule/stop/dispatch interleavings checked against a reference model.

use proptest::prelude::*;

use crate::{ClientId, MultiplexerState, Notifier, TimerKind};

const CLIENTS: u32 = 3;
const TIMERS: u32 = 4;

#[derive(Clone, Debug)]
enum Op {
    Relative { client: u32, slot: u32, ns: u64 },
    Absolute { client: u32, slot: u32, deadline_ns: u64 },
    Periodic { client: u32, slot: u32, period_ns: u64 },
    Stop { client: u32, slot: u32 },
    Dispatch { advance_ns: u64 },
    Poll { client: u32 },
}

fn arb_op() -> impl Strategy<Value = Op> {
    // Small time values so that equal deadlines are common.
    prop_oneof![
        (0..CLIENTS, 0..TIMERS, 0u64..40).prop_map(|(client, slot, ns)| Op::Relative {
            client,
            slot,
            ns
        }),
        (0..CLIENTS, 0..TIMERS, 0u64..200).prop_map(|(client, slot, deadline_ns)| {
            Op::Absolute {
                client,
                slot,
                deadline_ns,
            }
        }),
        (0..CLIENTS, 0..TIMERS, 1u64..25).prop_map(|(client, slot, period_ns)| Op::Periodic {
            client,
            slot,
            period_ns
        }),
        (0..CLIENTS, 0..TIMERS).prop_map(|(client, slot)| Op::Stop { client, slot }),
        (0u64..30).prop_map(|advance_ns| Op::Dispatch { advance_ns }),
        (0..CLIENTS).prop_map(|client| Op::Poll { client }),
    ]
}

#[derive(Clone, Copy, Debug)]
struct ModelTimer {
    client: u32,
    slot: u32,
    periodic: Option<u64>,
    deadline_ns: u64,
    seq: u64,
}

#[derive(Default)]
struct Model {
    armed: Vec<ModelTimer>,
    completed: [u32; CLIENTS as usize],
    seq: u64,
}

impl Model {
    fn disarm(&mut self, client: u32, slot: u32) {
        self.armed.retain(|t| !(t.client == client && t.slot == slot));
    }

    fn arm(&mut self, client: u32, slot: u32, periodic: Option<u64>, deadline_ns: u64) {
        self.disarm(client, slot);
        self.seq += 1;
        self.armed.push(ModelTimer {
            client,
            slot,
            periodic,
            deadline_ns,
            seq: self.seq,
        });
    }

    fn sorted(&self) -> Vec<ModelTimer> {
        let mut armed = self.armed.clone();
        armed.sort_by_key(|t| (t.deadline_ns, t.seq));
        armed
    }

    fn dispatch(&mut self, now_ns: u64) -> Vec<u32> {
        let mut notified = Vec::new();
        loop {
            let Some(first) = self.sorted().first().copied() else {
                break;
            };
            if first.deadline_ns > now_ns {
                break;
            }
            self.armed.retain(|t| t.seq != first.seq);
            notified.push(first.client);
            self.completed[first.client as usize] |= 1 << first.slot;
            if let Some(period) = first.periodic {
                self.seq += 1;
                self.armed.push(ModelTimer {
                    deadline_ns: first.deadline_ns + period,
                    seq: self.seq,
                    ..first
                });
            }
        }
        notified
    }
}

#[derive(Default)]
struct Recorder(std::sync::Mutex<Vec<u32>>);

impl Notifier for Recorder {
    fn notify(&self, client: ClientId) {
        self.0.lock().unwrap().push(client.index());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn queue_matches_stable_deadline_order(ops in prop::collection::vec(arb_op(), 1..64)) {
        let mut state = MultiplexerState::init(CLIENTS as usize, TIMERS as usize);
        let mut model = Model::default();
        let mut now_ns = 0u64;

        for op in ops {
            match op {
                Op::Relative { client, slot, ns } => {
                    state.schedule_relative(now_ns, ClientId::new(client), slot, ns).unwrap();
                    model.arm(client, slot, None, now_ns + ns);
                }
                Op::Absolute { client, slot, deadline_ns } => {
                    state.schedule_absolute(ClientId::new(client), slot, deadline_ns).unwrap();
                    model.arm(client, slot, None, deadline_ns);
                }
                Op::Periodic { client, slot, period_ns } => {
                    state.schedule_periodic(now_ns, ClientId::new(client), slot, period_ns).unwrap();
                    model.arm(client, slot, Some(period_ns), now_ns + period_ns);
                }
                Op::Stop { client, slot } => {
                    state.stop(ClientId::new(client), slot).unwrap();
                    model.disarm(client, slot);
                }
                Op::Dispatch { advance_ns } => {
                    now_ns += advance_ns;
                    let notes = Recorder::default();
                    let fired = state.dispatch(now_ns, &notes);
                    let expected = model.dispatch(now_ns);
                    prop_assert_eq!(fired, expected.len());
                    prop_assert_eq!(notes.0.into_inner().unwrap(), expected);
                }
                Op::Poll { client } => {
                    let got = state.poll_completed(ClientId::new(client)).unwrap();
                    let want = std::mem::take(&mut model.completed[client as usize]);
                    prop_assert_eq!(got, want);
                }
            }

            let actual: Vec<(u32, u32, u64)> = state
                .armed()
                .map(|t| (t.client.index(), t.slot, t.deadline_ns))
                .collect();
            let expected: Vec<(u32, u32, u64)> = model
                .sorted()
                .iter()
                .map(|t| (t.client, t.slot, t.deadline_ns))
                .collect();
            prop_assert_eq!(&actual, &expected);
            prop_assert!(actual.windows(2).all(|w| w[0].2 <= w[1].2));

            // Queued iff active.
            for client in 0..CLIENTS {
                for slot in 0..TIMERS {
                    let timer = state.slot(ClientId::new(client), slot).unwrap();
                    let queued = actual.iter().any(|&(c, s, _)| c == client && s == slot);
                    prop_assert_eq!(timer.kind() != TimerKind::Off, queued);
                    prop_assert_eq!(timer.is_queued(), queued);
                }
            }
        }
    }
}
