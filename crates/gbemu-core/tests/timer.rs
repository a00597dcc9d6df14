use gbemu_core::interrupts::{Interrupt, Interrupts};
use gbemu_core::timer::{DIV, TAC, TIMA, TMA, Timer};

fn cleared() -> Interrupts {
    let mut ints = Interrupts::new();
    ints.flags = 0;
    ints
}

#[test]
fn div_increments_every_256_cycles() {
    let mut timer = Timer::new();
    let mut ints = cleared();
    timer.step(255, &mut ints);
    assert_eq!(timer.read(DIV), 0);
    timer.step(1, &mut ints);
    assert_eq!(timer.read(DIV), 1);
    timer.step(256 * 9, &mut ints);
    assert_eq!(timer.read(DIV), 10);

    timer.write(DIV, 0x55, &mut ints);
    assert_eq!(timer.read(DIV), 0);
}

#[test]
fn tac_selects_tima_rate() {
    for (tac, period) in [(0x04, 1024), (0x05, 16), (0x06, 64), (0x07, 256)] {
        let mut timer = Timer::new();
        let mut ints = cleared();
        timer.write(TAC, tac, &mut ints);
        timer.step(period - 1, &mut ints);
        assert_eq!(timer.read(TIMA), 0, "TAC {tac:#04x}");
        timer.step(1, &mut ints);
        assert_eq!(timer.read(TIMA), 1, "TAC {tac:#04x}");
        timer.step(period * 3, &mut ints);
        assert_eq!(timer.read(TIMA), 4, "TAC {tac:#04x}");
    }
}

#[test]
fn disabled_timer_holds_tima() {
    let mut timer = Timer::new();
    let mut ints = cleared();
    timer.write(TAC, 0x01, &mut ints);
    timer.step(4096, &mut ints);
    assert_eq!(timer.read(TIMA), 0);
    assert_eq!(timer.read(TAC), 0xF9);
}

#[test]
fn overflow_reloads_tma_and_requests_interrupt() {
    let mut timer = Timer::new();
    let mut ints = cleared();
    timer.write(TMA, 0x42, &mut ints);
    timer.write(TIMA, 0xFF, &mut ints);
    timer.write(TAC, 0x05, &mut ints);
    timer.step(16, &mut ints);
    assert_eq!(timer.read(TIMA), 0x42);
    assert_ne!(ints.flags & Interrupt::Timer.bit(), 0);
}
