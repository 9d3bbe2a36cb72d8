//! Color bars test pattern
//!
//! Seven equal-width vertical bars (white, yellow, cyan, green, magenta,
//! red, blue) with a 5 pixel black indicator sweeping left to right. Each
//! frame is a pure function of the running counter, which advances by
//! [`INDICATOR_STEP`] per frame.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

pub const WIDTH: usize = 640;
pub const HEIGHT: usize = 480;
pub const CHANNELS: usize = 3;

pub const INDICATOR_WIDTH: usize = 5;
pub const INDICATOR_STEP: u64 = 5;

pub const BLACK: [u8; 3] = [0, 0, 0];

pub const BAR_COLORS: [[u8; 3]; 7] = [
    [255, 255, 255], // white
    [255, 255, 0],   // yellow
    [0, 255, 255],   // cyan
    [0, 255, 0],     // green
    [255, 0, 255],   // magenta
    [255, 0, 0],     // red
    [0, 0, 255],     // blue
];

/// 90 kHz RTP video clock
pub const VIDEO_CLOCK_RATE: u32 = 90_000;
pub const FRAME_RATE: u32 = 30;
pub const FRAME_DURATION: Duration = Duration::from_nanos(1_000_000_000 / FRAME_RATE as u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

pub const VIDEO_TIME_BASE: TimeBase = TimeBase {
    num: 1,
    den: VIDEO_CLOCK_RATE,
};

/// RGB24 frame, rows top to bottom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
    pub pts: u64,
    pub time_base: TimeBase,
}

impl VideoFrame {
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

/// Bar index for column `x`; the last bar absorbs the division remainder
pub fn bar_index(x: usize) -> usize {
    let bar_width = WIDTH / BAR_COLORS.len();
    (x / bar_width).min(BAR_COLORS.len() - 1)
}

/// Left edge of the indicator for a given counter value
pub fn indicator_position(counter: u64) -> usize {
    (counter % WIDTH as u64) as usize
}

/// Renders the pattern for `counter`. The indicator is clipped at the right
/// edge rather than wrapping around.
pub fn render_color_bars(counter: u64) -> Vec<u8> {
    let mut row = Vec::with_capacity(WIDTH * CHANNELS);
    for x in 0..WIDTH {
        row.extend_from_slice(&BAR_COLORS[bar_index(x)]);
    }

    let start = indicator_position(counter);
    let end = (start + INDICATOR_WIDTH).min(WIDTH);
    for x in start..end {
        row[x * CHANNELS..(x + 1) * CHANNELS].copy_from_slice(&BLACK);
    }

    row.repeat(HEIGHT)
}

/// Hands out presentation timestamps, suspending until each one is due
#[async_trait]
pub trait FrameClock: Send {
    async fn next_timestamp(&mut self) -> (u64, TimeBase);
}

/// Paces frames in real time at [`FRAME_RATE`]
#[derive(Debug, Default)]
pub struct RealtimeClock {
    start: Option<Instant>,
    pts: u64,
}

#[async_trait]
impl FrameClock for RealtimeClock {
    async fn next_timestamp(&mut self) -> (u64, TimeBase) {
        match self.start {
            None => {
                self.start = Some(Instant::now());
                self.pts = 0;
            }
            Some(start) => {
                self.pts += u64::from(VIDEO_CLOCK_RATE / FRAME_RATE);
                let due = start + Duration::from_micros(self.pts * 1_000_000 / u64::from(VIDEO_CLOCK_RATE));
                tokio::time::sleep_until(due).await;
            }
        }
        (self.pts, VIDEO_TIME_BASE)
    }
}

/// Infinite color bars source. Not restartable: the counter only moves forward.
pub struct PatternSource<C = RealtimeClock> {
    clock: C,
    counter: u64,
}

impl PatternSource<RealtimeClock> {
    pub fn new() -> Self {
        Self::with_clock(RealtimeClock::default())
    }
}

impl Default for PatternSource<RealtimeClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: FrameClock> PatternSource<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock, counter: 0 }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub async fn next_frame(&mut self) -> VideoFrame {
        let (pts, time_base) = self.clock.next_timestamp().await;
        let data = render_color_bars(self.counter);
        self.counter += INDICATOR_STEP;
        VideoFrame {
            width: WIDTH,
            height: HEIGHT,
            data,
            pts,
            time_base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Returns the same timestamp forever, no waiting
    struct FixedClock(u64);

    #[async_trait]
    impl FrameClock for FixedClock {
        async fn next_timestamp(&mut self) -> (u64, TimeBase) {
            (self.0, VIDEO_TIME_BASE)
        }
    }

    fn source() -> PatternSource<FixedClock> {
        PatternSource::with_clock(FixedClock(0))
    }

    fn indicator_start(frame: &VideoFrame) -> Option<usize> {
        (0..WIDTH).find(|&x| frame.pixel(x, 0) == BLACK)
    }

    #[tokio::test]
    async fn frame_has_fixed_geometry() {
        let frame = source().next_frame().await;
        assert_eq!((frame.width, frame.height), (640, 480));
        assert_eq!(frame.data.len(), 640 * 480 * 3);
        assert_eq!(frame.time_base, VIDEO_TIME_BASE);
    }

    #[tokio::test]
    async fn counter_advances_by_five() {
        let mut src = source();
        assert_eq!(src.counter(), 0);
        src.next_frame().await;
        assert_eq!(src.counter(), 5);
        src.next_frame().await;
        assert_eq!(src.counter(), 10);
    }

    #[tokio::test]
    async fn indicator_follows_counter_modulo_width() {
        let mut src = source();
        for n in 0..300u64 {
            let frame = src.next_frame().await;
            assert_eq!(indicator_start(&frame), Some(((5 * n) % 640) as usize), "call {n}");
        }
    }

    #[test]
    fn indicator_is_clipped_at_right_edge() {
        let data = render_color_bars(638);
        let frame = VideoFrame {
            width: WIDTH,
            height: HEIGHT,
            data,
            pts: 0,
            time_base: VIDEO_TIME_BASE,
        };
        assert_eq!(frame.pixel(637, 10), BAR_COLORS[6]);
        assert_eq!(frame.pixel(638, 10), BLACK);
        assert_eq!(frame.pixel(639, 10), BLACK);
        // no wraparound onto the left edge
        assert_eq!(frame.pixel(0, 10), BAR_COLORS[0]);
    }

    #[test]
    fn bar_boundaries() {
        // 640 / 7 = 91; the last bar covers 546..640
        assert_eq!(bar_index(0), 0);
        assert_eq!(bar_index(90), 0);
        assert_eq!(bar_index(91), 1);
        assert_eq!(bar_index(545), 5);
        assert_eq!(bar_index(546), 6);
        assert_eq!(bar_index(639), 6);
    }

    #[tokio::test]
    async fn frame_contains_all_bars_and_indicator() {
        let frame = source().next_frame().await;
        let colors: HashSet<&[u8]> = frame.data.chunks(3).collect();
        assert!(colors.len() >= 7);
        for color in BAR_COLORS {
            assert!(colors.contains(&color[..]));
        }
        assert!(colors.contains(&BLACK[..]));
    }

    #[tokio::test]
    async fn indicator_moves_between_frames() {
        let mut src = source();
        let frames: Vec<VideoFrame> = {
            let mut v = Vec::new();
            for _ in 0..4 {
                v.push(src.next_frame().await);
            }
            v
        };
        assert_ne!(frames[0].data, frames[1].data);
        // non-adjacent pair as well
        assert_ne!(frames[1].data, frames[3].data);
    }

    #[tokio::test]
    async fn replay_from_zero_is_byte_identical() {
        let mut first = source();
        let mut second = source();
        for _ in 0..3 {
            assert_eq!(first.next_frame().await.data, second.next_frame().await.data);
        }
        assert_eq!(render_color_bars(0), render_color_bars(640));
    }

    #[tokio::test(start_paused = true)]
    async fn realtime_clock_paces_at_frame_rate() {
        let mut clock = RealtimeClock::default();
        let started = Instant::now();

        let (pts0, tb) = clock.next_timestamp().await;
        assert_eq!(pts0, 0);
        assert_eq!(tb, VIDEO_TIME_BASE);

        let (pts1, _) = clock.next_timestamp().await;
        let (pts2, _) = clock.next_timestamp().await;
        assert_eq!(pts1, 3000);
        assert_eq!(pts2, 6000);
        assert!(started.elapsed() >= Duration::from_micros(66_666));
    }
}
