use apc_library::{ButtonKind, Color, Controller, Result};
use std::{thread, time};

pub(crate) fn self_test(controller: &Controller) -> Result<()> {
    let rainbow = [
        Color::Red,
        Color::Orange,
        Color::Yellow,
        Color::Lime,
        Color::Green,
        Color::LightBlue,
        Color::Blue,
    ];

    // Diagonal rainbow sweeping across the grid (8 frames, ~50ms each)
    for frame in 0..8 {
        for index in 0..64u8 {
            let (row, col) = (usize::from(index / 8), usize::from(index % 8));
            let color = rainbow[(row + col + frame * 2) % rainbow.len()];
            controller.set_pad(index, color, 6)?;
        }
        thread::sleep(time::Duration::from_millis(50));
    }

    // Cascade the indicator buttons, track row then scene row
    for kind in [ButtonKind::Track, ButtonKind::Scene] {
        for slot in 0..8 {
            controller.set_button(kind, slot, Color::Red, 6)?;
            thread::sleep(time::Duration::from_millis(15));
        }
    }

    // Final flash
    controller.set_all_pads(Color::White, 6)?;
    thread::sleep(time::Duration::from_millis(200));

    controller.clear_all()
}
