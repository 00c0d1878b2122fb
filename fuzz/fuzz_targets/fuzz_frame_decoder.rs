#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let Ok(frame) = flowguard_core::protocol::decode_frame(data) else {
        return;
    };
    if let flowguard_core::protocol::InboundFrame::Status(update) = frame {
        let mut session = flowguard_core::session::PrintSession::new("");
        let _ = session.apply_status(&update, 0);
        let _ = session.remaining_ticks();
    }
});
