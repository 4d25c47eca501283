//! The routines behind [`Animation`](super::Animation). Each one loops until
//! its frame reports a stop. Rows count from the bottom of the grid.

use super::{Flow, Frame};
use crate::colors::Color;
use crate::controls::{GRID_SIZE, PAD_COUNT};
use rand::Rng;
use std::collections::VecDeque;
use std::f32::consts::{PI, TAU};

const SIZE: usize = GRID_SIZE as usize;
const PADS: usize = PAD_COUNT as usize;
const CENTER: f32 = 3.5;

fn cells() -> impl Iterator<Item = (usize, usize)> {
    (0..SIZE).flat_map(|row| (0..SIZE).map(move |col| (row, col)))
}

fn pick<R: Rng>(rng: &mut R, colors: &[Color]) -> Color {
    colors[rng.gen_range(0..colors.len())]
}

fn distance(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    ((x1 - x2).powi(2) + (y1 - y2).powi(2)).sqrt()
}

/// Grid cell for a float coordinate: clamped into the grid, then truncated.
fn cell(value: f32) -> usize {
    value.clamp(0.0, (SIZE - 1) as f32) as usize
}

const RAINBOW: [Color; 5] = [Color::Red, Color::Orange, Color::Yellow, Color::Green, Color::Blue];
const RAINBOW_STEPS: usize = 6;

/// Band color for a diagonal position, dimming through each band.
fn rainbow_cell(row: usize, col: usize, offset: usize) -> (Color, u8) {
    let position = (row + col + offset) % (RAINBOW.len() * RAINBOW_STEPS);
    let within = position % RAINBOW_STEPS;
    (RAINBOW[position / RAINBOW_STEPS], 6 - (within / 2) as u8)
}

pub(super) fn rainbow(frame: &mut Frame) -> Flow {
    let mut offset = 0;
    loop {
        for (row, col) in cells() {
            let (color, channel) = rainbow_cell(row, col, offset);
            frame.set(row, col, color, channel)?;
        }
        offset = (offset + 1) % (RAINBOW.len() * RAINBOW_STEPS);
        frame.sleep(80)?;
    }
}

const WAVE: [Color; 3] = [Color::Blue, Color::Green, Color::Yellow];
const WAVE_LENGTH: usize = 12;

fn wave_cell(row: usize, col: usize, offset: usize) -> (Color, u8) {
    let position = (row + col + offset) % WAVE_LENGTH;
    let height = (TAU * position as f32 / WAVE_LENGTH as f32).sin() + 1.0;
    let color = WAVE[((height * 1.5) as usize).min(WAVE.len() - 1)];
    let brightness = ((height * 3.0) as u8).clamp(3, 6);
    (color, brightness)
}

pub(super) fn wave(frame: &mut Frame) -> Flow {
    loop {
        for offset in 0..WAVE_LENGTH {
            for (row, col) in cells() {
                let (color, channel) = wave_cell(row, col, offset);
                frame.set(row, col, color, channel)?;
            }
            frame.sleep(50)?;
        }
    }
}

pub(super) fn rain(frame: &mut Frame) -> Flow {
    loop {
        // Bottom-up so each drop moves exactly one row per frame
        for row in 0..SIZE {
            for col in 0..SIZE {
                if !frame.is_lit(row, col) {
                    continue;
                }
                frame.off(row, col)?;
                if row > 0 {
                    let fade = (6 - (SIZE - 1 - row) as i32).max(1) as u8;
                    frame.set(row - 1, col, Color::LightBlue, fade)?;
                }
            }
        }
        for _ in 0..3 {
            let col = frame.rng().gen_range(0..SIZE);
            frame.set(SIZE - 1, col, Color::LightBlue, 6)?;
        }
        frame.sleep(100)?;
    }
}

const SNAKE_LENGTH: usize = 5;
// Clockwise turn order, as (row, col) steps
const HEADINGS: [(i32, i32); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

pub(super) fn snake(frame: &mut Frame) -> Flow {
    let mut body: VecDeque<(i32, i32)> = VecDeque::from([(0, 0)]);
    let mut heading = 0;
    loop {
        let (row, col) = body[0];
        let (d_row, d_col) = HEADINGS[heading];
        let next = (row + d_row, col + d_col);
        let in_grid = |v: i32| (0..SIZE as i32).contains(&v);
        if !in_grid(next.0) || !in_grid(next.1) {
            heading = (heading + 1) % HEADINGS.len();
            continue;
        }

        body.push_front(next);
        if body.len() > SNAKE_LENGTH {
            if let Some((row, col)) = body.pop_back() {
                frame.off(row as usize, col as usize)?;
            }
        }
        for (i, (row, col)) in body.iter().enumerate() {
            let color = if i == 0 { Color::Red } else { Color::DarkRed };
            frame.set(*row as usize, *col as usize, color, 6)?;
        }
        frame.sleep(100)?;
    }
}

fn ripple_cell(row: usize, col: usize, radius: usize) -> Color {
    let d = distance(col as f32, row as f32, CENTER, CENTER);
    let height = (d - radius as f32 / 2.0).sin();
    if height > 0.5 {
        Color::DarkLime
    } else if height > 0.0 {
        Color::Blue
    } else if height > -0.5 {
        Color::DarkBlue
    } else {
        Color::Off
    }
}

pub(super) fn ripple(frame: &mut Frame) -> Flow {
    loop {
        for radius in 0..12 {
            for (row, col) in cells() {
                frame.set(row, col, ripple_cell(row, col, radius), 6)?;
            }
            frame.sleep(50)?;
        }
    }
}

pub(super) fn random(frame: &mut Frame) -> Flow {
    let palette = &Color::ALL[1..];
    loop {
        let note = frame.rng().gen_range(0..PADS);
        let color = pick(frame.rng(), palette);
        frame.set_note(note, color, 6)?;
        frame.sleep(50)?;
    }
}

fn spiral_cell(row: usize, col: usize, angle: f32) -> (Color, u8) {
    let (dx, dy) = (col as f32 - CENTER, row as f32 - CENTER);
    let theta = dy.atan2(dx).to_degrees();
    let sector = (theta + angle).rem_euclid(360.0) * RAINBOW.len() as f32 / 360.0;
    let color = RAINBOW[(sector as usize).min(RAINBOW.len() - 1)];
    let d = (dx * dx + dy * dy).sqrt();
    (color, 6 - (d as u8).min(3))
}

pub(super) fn spiral(frame: &mut Frame) -> Flow {
    let mut angle = 0.0_f32;
    loop {
        for (row, col) in cells() {
            let (color, channel) = spiral_cell(row, col, angle);
            frame.set(row, col, color, channel)?;
        }
        angle = (angle + 6.0) % 360.0;
        frame.sleep(10)?;
    }
}

const FIREWORK: [Color; 4] = [Color::Red, Color::Blue, Color::Green, Color::Yellow];

/// Cells at exactly `radius` steps (Manhattan) from `(row, col)`.
fn ring(row: usize, col: usize, radius: usize) -> Vec<(usize, usize)> {
    let radius = radius as i32;
    let (row, col) = (row as i32, col as i32);
    let mut cells = Vec::new();
    for d_row in -radius..=radius {
        for d_col in -radius..=radius {
            let (r, c) = (row + d_row, col + d_col);
            let on_ring = d_row.abs() + d_col.abs() == radius;
            if on_ring && (0..SIZE as i32).contains(&r) && (0..SIZE as i32).contains(&c) {
                cells.push((r as usize, c as usize));
            }
        }
    }
    cells
}

pub(super) fn firework(frame: &mut Frame) -> Flow {
    loop {
        let col = frame.rng().gen_range(0..SIZE);
        let color = pick(frame.rng(), &FIREWORK);
        for row in 0..SIZE {
            frame.set(row, col, color, 6)?;
            frame.sleep(50)?;
            frame.off(row, col)?;
        }

        let burst = frame.rng().gen_range(4..SIZE);
        for radius in 0..5 {
            for (row, c) in ring(burst, col, radius) {
                frame.set(row, c, color, 6 - radius as u8)?;
            }
            frame.sleep(50)?;
        }
        frame.sleep(200)?;
        frame.blank()?;
        frame.sleep(300)?;
    }
}

pub(super) fn pulse(frame: &mut Frame) -> Flow {
    const COLORS: [Color; 3] = [Color::Red, Color::Blue, Color::Green];
    loop {
        for channel in (0..=6).chain((0..=6).rev()) {
            for note in 0..PADS {
                frame.set_note(note, COLORS[note % COLORS.len()], channel)?;
            }
            frame.sleep(50)?;
        }
    }
}

pub(super) fn color_wipe(frame: &mut Frame) -> Flow {
    const COLORS: [Color; 4] = [Color::Red, Color::Yellow, Color::Green, Color::Blue];
    loop {
        for color in COLORS {
            for col in 0..SIZE {
                for row in 0..SIZE {
                    frame.set(row, col, color, 6)?;
                }
                frame.sleep(50)?;
            }
            frame.sleep(100)?;
        }
    }
}

pub(super) fn energy_field(frame: &mut Frame) -> Flow {
    const COLORS: [Color; 4] = [Color::Blue, Color::LightBlue, Color::Green, Color::LightGreen];
    let limit = (SIZE - 1) as f32;
    let mut points: Vec<(f32, f32)> = (0..3)
        .map(|_| {
            let rng = frame.rng();
            (rng.gen_range(0.0..=limit), rng.gen_range(0.0..=limit))
        })
        .collect();
    let mut time = 0.0_f32;
    loop {
        for (row, col) in cells() {
            let energy: f32 = points
                .iter()
                .map(|&(x, y)| {
                    let d = distance(col as f32, row as f32, x, y);
                    (d + time).sin() / (d + 1.0)
                })
                .sum();
            let level = (energy + 3.0) / 6.0;
            let color = COLORS[((level * 4.0) as usize).min(COLORS.len() - 1)];
            frame.set(row, col, color, ((level * 6.0) as u8).clamp(3, 6))?;
        }
        for point in points.iter_mut() {
            let rng = frame.rng();
            point.0 = (point.0 + rng.gen_range(-0.1..=0.1)).clamp(0.0, limit);
            point.1 = (point.1 + rng.gen_range(-0.1..=0.1)).clamp(0.0, limit);
        }
        time += 0.2;
        frame.sleep(50)?;
    }
}

pub(super) fn dna_helix(frame: &mut Frame) -> Flow {
    const STRANDS: [Color; 2] = [Color::Red, Color::Blue];
    const HEIGHT: f32 = 4.0;
    const LENGTH: f32 = 12.0;
    let mut offset = 0.0_f32;
    loop {
        frame.blank()?;
        for (strand, color) in STRANDS.into_iter().enumerate() {
            let phase = PI * strand as f32;
            for x in 0..SIZE * 2 {
                let y = HEIGHT * (x as f32 / LENGTH * TAU + offset + phase).sin();
                let col = (x / 2) % SIZE;
                let row = (CENTER + y) as i32;
                if (0..SIZE as i32).contains(&row) {
                    let brightness = 4 + (2.0 * (x as f32 / 4.0).sin().abs()) as u8;
                    frame.set(row as usize, col, color, brightness)?;
                }
                if strand == 0 && x % 4 == 0 {
                    let link = (CENTER - y / 2.0) as i32;
                    if (0..SIZE as i32).contains(&link) {
                        frame.set(link as usize, col, Color::Yellow, 5)?;
                    }
                }
            }
        }
        offset += 0.2;
        frame.sleep(50)?;
    }
}

pub(super) fn tetris(frame: &mut Frame) -> Flow {
    loop {
        let width = frame.rng().gen_range(2..=4);
        let start = frame.rng().gen_range(0..=SIZE - width);
        let color = pick(frame.rng(), &FIREWORK);
        for step in 0..SIZE {
            let row = SIZE - 1 - step;
            for col in start..start + width {
                frame.set(row, col, color, 6)?;
            }
            frame.sleep(100)?;
            // The block comes to rest on the bottom row
            if row > 0 {
                for col in start..start + width {
                    frame.off(row, col)?;
                }
            }
        }
        frame.sleep(200)?;
    }
}

pub(super) fn laser(frame: &mut Frame) -> Flow {
    loop {
        let col = frame.rng().gen_range(0..SIZE);
        for charge in 0..5 {
            frame.set(0, col, Color::Red, 3 + charge)?;
            frame.sleep(100)?;
        }
        for row in 0..SIZE {
            frame.set(row, col, Color::Red, 6)?;
            if col > 0 {
                frame.set(row, col - 1, Color::Orange, 4)?;
            }
            frame.set(row, col + 1, Color::Orange, 4)?;
            frame.sleep(30)?;
        }
        frame.sleep(100)?;
        frame.blank()?;
        frame.sleep(200)?;
    }
}

struct Star {
    radius: f32,
    angle: f32,
    speed: f32,
}

pub(super) fn galaxy(frame: &mut Frame) -> Flow {
    let limit = (SIZE - 1) as f32;
    let mut stars: Vec<Star> = (0..10)
        .map(|_| {
            let rng = frame.rng();
            let (x, y) = (rng.gen_range(0.0..=limit), rng.gen_range(0.0..=limit));
            Star {
                radius: distance(x, y, CENTER, CENTER),
                angle: rng.gen_range(0.0..TAU),
                speed: rng.gen_range(0.02..=0.06),
            }
        })
        .collect();
    loop {
        frame.blank()?;
        for star in stars.iter_mut() {
            let x = CENTER + star.radius * star.angle.cos();
            let y = CENTER + star.radius * star.angle.sin();
            if (0.0..SIZE as f32).contains(&x) && (0.0..SIZE as f32).contains(&y) {
                let color = if star.radius < 2.0 { Color::White } else { Color::Yellow };
                let brightness = 6 - (star.radius as u8).min(3);
                frame.set(y as usize, x as usize, color, brightness)?;
            }
            star.angle += star.speed / (star.radius + 0.5);
        }
        frame.sleep(100)?;
    }
}

pub(super) fn piano(frame: &mut Frame) -> Flow {
    loop {
        let col = frame.rng().gen_range(0..SIZE);
        let color = if col % 2 == 0 { Color::White } else { Color::Blue };
        for row in 0..SIZE {
            frame.set(row, col, color, 6)?;
            frame.sleep(20)?;
        }
        for row in (0..SIZE).rev() {
            frame.set(row, col, color, 3)?;
            frame.sleep(20)?;
        }
        frame.sleep(100)?;
    }
}

fn level_color(row: usize) -> Color {
    match row {
        0..=2 => Color::Green,
        3..=4 => Color::Yellow,
        _ => Color::Red,
    }
}

pub(super) fn equalizer(frame: &mut Frame) -> Flow {
    let mut levels = [0usize; SIZE];
    let mut targets = [0usize; SIZE];
    loop {
        for target in targets.iter_mut() {
            if frame.rng().gen_bool(0.3) {
                *target = frame.rng().gen_range(0..SIZE);
            }
        }
        for col in 0..SIZE {
            match levels[col].cmp(&targets[col]) {
                std::cmp::Ordering::Less => levels[col] += 1,
                std::cmp::Ordering::Greater => levels[col] -= 1,
                std::cmp::Ordering::Equal => {}
            }
            for row in 0..SIZE {
                if row <= levels[col] {
                    frame.set(row, col, level_color(row), 6)?;
                } else {
                    frame.off(row, col)?;
                }
            }
        }
        frame.sleep(50)?;
    }
}

pub(super) fn bounce(frame: &mut Frame) -> Flow {
    const GRAVITY: f32 = 0.2;
    const DAMPING: f32 = 0.8;
    let floor = (SIZE - 1) as f32;
    // `drop` grows downwards from the top row
    let mut x = frame.rng().gen_range(0..SIZE) as f32;
    let mut drop = 0.0_f32;
    let mut dx = 1.0_f32;
    let mut velocity = 0.0_f32;
    loop {
        frame.off(SIZE - 1 - cell(drop), cell(x))?;
        velocity += GRAVITY;
        drop += velocity;
        x += dx;
        if drop >= floor {
            drop = floor;
            velocity = -velocity * DAMPING;
        }
        if x >= floor || x <= 0.0 {
            dx = -dx;
            x = x.clamp(0.0, floor);
        }
        frame.set(SIZE - 1 - cell(drop), cell(x), Color::Yellow, 6)?;
        frame.sleep(50)?;
    }
}

pub(super) fn sparkle(frame: &mut Frame) -> Flow {
    const COLORS: [Color; 2] = [Color::White, Color::Yellow];
    loop {
        for _ in 0..3 {
            let note = frame.rng().gen_range(0..PADS);
            let color = pick(frame.rng(), &COLORS);
            frame.set_note(note, color, 6)?;
        }
        frame.sleep(150)?;
        frame.blank()?;
    }
}

pub(super) fn chase(frame: &mut Frame) -> Flow {
    const TAIL: usize = 5;
    const COLORS: [Color; 3] = [Color::Red, Color::Blue, Color::Green];
    let color = pick(frame.rng(), &COLORS);
    let mut head = 0;
    loop {
        for i in 0..TAIL {
            let note = (head + PADS - i) % PADS;
            frame.set_note(note, color, (6 - i as i32).max(1) as u8)?;
        }
        frame.off_note((head + PADS - TAIL) % PADS)?;
        head = (head + 1) % PADS;
        frame.sleep(50)?;
    }
}
