//! The scan controller.
//!
//! [`Matrix`] owns the pixel buffer and both double buffers. [`Matrix::begin`]
//! starts the hardware and splits the matrix into two handles:
//!
//! - [`Display`] for the foreground: draw, [`Display::show`], change
//!   brightness.
//! - [`Scanner`] for the major-loop-complete interrupt: call
//!   [`Scanner::refresh`] once per completion.
//!
//! The handles share the scan tables through [`SwapBuffer`]s only, so a
//! frame is either shown whole or not at all, and nothing ever blocks.
//!
//! # Example
//! ```rust,ignore
//! use bcm_matrix::{compute_frame_len, compute_table_len, Matrix, TimerConfig};
//!
//! const ROWS: usize = 8;
//! const COLS: usize = 8;
//! const PWM_BITS: u8 = 12;
//! const PAGED_BITS: u8 = 2;
//! type Panel = Matrix<
//!     ROWS,
//!     COLS,
//!     PWM_BITS,
//!     PAGED_BITS,
//!     { compute_table_len(ROWS, PWM_BITS) },
//!     { compute_frame_len(ROWS, COLS, PWM_BITS, PAGED_BITS) },
//! >;
//!
//! let mut matrix = Panel::new(TimerConfig::DEFAULT)?;
//! let (mut display, scanner) = matrix.begin(engine)?;
//! // hand `scanner` to the DMA interrupt, then:
//! display.set_pixel_color(0, 0, 255, 0, 0);
//! display.show();
//! ```

use crate::address::AddressTable;
use crate::dma::{ScanEngine, ScanTransfer};
use crate::encoder::Frame;
use crate::pixels::PixelBuffer;
use crate::preview::Preview;
use crate::swap::SwapBuffer;
use crate::timer::{clamp_brightness, TimerConfig, TimerTable};
use crate::{
    compute_bit_depth, compute_frame_len, compute_pages, compute_panel_depth, compute_table_len,
    compute_writes_per_plane, Color, Result,
};

/// Tables read by the channels while the scan runs.
struct ScanState<const TABLE_LEN: usize, const FRAME_LEN: usize> {
    address: AddressTable<TABLE_LEN>,
    timers: SwapBuffer<TimerTable<TABLE_LEN>>,
    frames: SwapBuffer<Frame<FRAME_LEN>>,
}

/// A DMA-scanned LED matrix.
///
/// # Type Parameters
///
/// * `ROWS` - Multiplexed rows, at most 32
/// * `COLS` - Columns per row
/// * `PWM_BITS` - Hardware bit-planes per row
/// * `PAGED_BITS` - Extra bits realised by temporal dithering
/// * `TABLE_LEN` - Must be [`compute_table_len`]`(ROWS, PWM_BITS)`
/// * `FRAME_LEN` - Must be [`compute_frame_len`]`(ROWS, COLS, PWM_BITS, PAGED_BITS)`
///
/// Inconsistent parameters are rejected when [`Matrix::new`] is compiled.
pub struct Matrix<
    const ROWS: usize,
    const COLS: usize,
    const PWM_BITS: u8,
    const PAGED_BITS: u8,
    const TABLE_LEN: usize,
    const FRAME_LEN: usize,
> {
    pixels: PixelBuffer<ROWS, COLS>,
    brightness: f32,
    config: TimerConfig,
    state: ScanState<TABLE_LEN, FRAME_LEN>,
}

impl<
        const ROWS: usize,
        const COLS: usize,
        const PWM_BITS: u8,
        const PAGED_BITS: u8,
        const TABLE_LEN: usize,
        const FRAME_LEN: usize,
    > Matrix<ROWS, COLS, PWM_BITS, PAGED_BITS, TABLE_LEN, FRAME_LEN>
{
    const GEOMETRY: () = {
        assert!(ROWS >= 1 && ROWS <= 32, "ROWS must fit five address bits");
        assert!(COLS >= 1, "COLS must not be zero");
        assert!(PWM_BITS >= 1 && PWM_BITS <= 16, "PWM_BITS must be 1..=16");
        assert!(PAGED_BITS <= 4, "PAGED_BITS must be 0..=4");
        assert!(
            compute_bit_depth(PWM_BITS, PAGED_BITS) <= 16,
            "PWM_BITS + PAGED_BITS must not exceed 16"
        );
        assert!(
            TABLE_LEN == compute_table_len(ROWS, PWM_BITS),
            "TABLE_LEN must be compute_table_len(ROWS, PWM_BITS)"
        );
        assert!(
            FRAME_LEN == compute_frame_len(ROWS, COLS, PWM_BITS, PAGED_BITS),
            "FRAME_LEN must be compute_frame_len(ROWS, COLS, PWM_BITS, PAGED_BITS)"
        );
    };

    /// Create a stopped matrix with all pixels off and full brightness.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not fit the timer for `PWM_BITS`
    /// bit-planes, see [`TimerConfig::validate`].
    pub fn new(config: TimerConfig) -> Result<Self> {
        let () = Self::GEOMETRY;
        config.validate(PWM_BITS)?;
        Ok(Self {
            pixels: PixelBuffer::new(),
            brightness: 1.0,
            config,
            state: ScanState {
                address: AddressTable::idle(),
                timers: SwapBuffer::new(TimerTable::zeroed()),
                frames: SwapBuffer::new(Frame::zeroed()),
            },
        })
    }

    /// Set the brightness used when the scan starts, clamped to `[0, 1]`.
    pub fn set_brightness(&mut self, brightness: f32) {
        self.brightness = clamp_brightness(brightness);
    }

    /// The stored brightness.
    #[must_use]
    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    /// The timer configuration.
    #[must_use]
    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Pixels shown once the scan starts.
    #[must_use]
    pub fn pixels(&self) -> &PixelBuffer<ROWS, COLS> {
        &self.pixels
    }

    /// Mutable access to the pixels shown once the scan starts.
    pub fn pixels_mut(&mut self) -> &mut PixelBuffer<ROWS, COLS> {
        &mut self.pixels
    }

    /// Build the tables, claim the hardware and start scanning page 0.
    ///
    /// Both frame buffers start out holding the current pixels.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if a channel or the timer cannot be
    /// claimed. Nothing has been started in that case.
    pub fn begin<E: ScanEngine>(
        &mut self,
        mut engine: E,
    ) -> Result<(
        Display<'_, ROWS, COLS, PWM_BITS, PAGED_BITS, TABLE_LEN, FRAME_LEN>,
        Scanner<'_, E, ROWS, COLS, PWM_BITS, PAGED_BITS, TABLE_LEN, FRAME_LEN>,
    )> {
        let Self {
            pixels,
            brightness,
            config,
            state,
        } = self;

        state.address = AddressTable::new(ROWS, PWM_BITS);
        state
            .timers
            .reset(TimerTable::build(ROWS, PWM_BITS, *brightness, config));
        state
            .frames
            .reset(Frame::encoded(pixels, PWM_BITS, PAGED_BITS));

        if let Err(err) = engine.claim() {
            warn!("scan resources unavailable: {}", err);
            return Err(err);
        }

        let state = &*state;
        let mut scanner = Scanner {
            state,
            engine,
            page: 0,
            frames_presented: 0,
        };
        scanner.park();
        scanner.arm();
        scanner.engine.start();

        debug!(
            "scan started: {}x{}, {} pwm bits, {} pages, {} slots",
            ROWS,
            COLS,
            PWM_BITS,
            compute_pages(PAGED_BITS),
            TABLE_LEN - 1
        );

        let display = Display {
            pixels,
            brightness,
            config: *config,
            state,
        };
        Ok((display, scanner))
    }
}

/// Foreground handle of a running scan.
pub struct Display<
    'a,
    const ROWS: usize,
    const COLS: usize,
    const PWM_BITS: u8,
    const PAGED_BITS: u8,
    const TABLE_LEN: usize,
    const FRAME_LEN: usize,
> {
    pixels: &'a mut PixelBuffer<ROWS, COLS>,
    brightness: &'a mut f32,
    config: TimerConfig,
    state: &'a ScanState<TABLE_LEN, FRAME_LEN>,
}

impl<
        const ROWS: usize,
        const COLS: usize,
        const PWM_BITS: u8,
        const PAGED_BITS: u8,
        const TABLE_LEN: usize,
        const FRAME_LEN: usize,
    > Display<'_, ROWS, COLS, PWM_BITS, PAGED_BITS, TABLE_LEN, FRAME_LEN>
{
    /// Change the brightness, clamped to `[0, 1]`.
    ///
    /// Rebuilds the timer table; the scan picks it up at the next major-loop
    /// boundary. Pixel data is not re-encoded.
    pub fn set_brightness(&mut self, brightness: f32) {
        let brightness = clamp_brightness(brightness);
        *self.brightness = brightness;
        let config = &self.config;
        self.state
            .timers
            .publish(|table| *table = TimerTable::build(ROWS, PWM_BITS, brightness, config));
        debug!("timer table rebuilt");
    }

    /// The current brightness.
    #[must_use]
    pub fn brightness(&self) -> f32 {
        *self.brightness
    }

    /// Set one pixel. Takes effect on the next [`Display::show`].
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside the matrix.
    pub fn set_pixel_color(&mut self, column: usize, row: usize, r: u8, g: u8, b: u8) {
        self.pixels.set_pixel_color(column, row, r, g, b);
    }

    /// Set one pixel. Takes effect on the next [`Display::show`].
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside the matrix.
    pub fn set_pixel(&mut self, column: usize, row: usize, color: Color) {
        self.pixels.set_pixel(column, row, color);
    }

    /// The pixel buffer.
    #[must_use]
    pub fn pixels(&self) -> &PixelBuffer<ROWS, COLS> {
        self.pixels
    }

    /// The pixel buffer, also usable as an `embedded-graphics` draw target.
    pub fn pixels_mut(&mut self) -> &mut PixelBuffer<ROWS, COLS> {
        self.pixels
    }

    /// Encode the pixel buffer into the back frame and queue it for display.
    ///
    /// If an earlier frame is still waiting it is replaced.
    pub fn show(&mut self) {
        let pixels = &*self.pixels;
        self.state
            .frames
            .publish(|frame| frame.encode(pixels, PWM_BITS, PAGED_BITS));
    }

    /// Whether a shown frame has not reached the scan yet.
    #[must_use]
    pub fn is_update_pending(&self) -> bool {
        self.state.frames.is_pending()
    }
}

/// Interrupt handle of a running scan.
pub struct Scanner<
    'a,
    E,
    const ROWS: usize,
    const COLS: usize,
    const PWM_BITS: u8,
    const PAGED_BITS: u8,
    const TABLE_LEN: usize,
    const FRAME_LEN: usize,
> {
    state: &'a ScanState<TABLE_LEN, FRAME_LEN>,
    engine: E,
    page: usize,
    frames_presented: usize,
}

impl<
        E: ScanEngine,
        const ROWS: usize,
        const COLS: usize,
        const PWM_BITS: u8,
        const PAGED_BITS: u8,
        const TABLE_LEN: usize,
        const FRAME_LEN: usize,
    > Scanner<'_, E, ROWS, COLS, PWM_BITS, PAGED_BITS, TABLE_LEN, FRAME_LEN>
{
    /// Handle a completed major loop.
    ///
    /// Parks the bus, takes over a ready timer table and frame, moves to the
    /// next page and re-arms all four channels.
    pub fn refresh(&mut self) {
        self.park();
        if self.state.timers.flip() {
            trace!("timer table swapped");
        }
        if self.state.frames.flip() {
            self.frames_presented = self.frames_presented.wrapping_add(1);
            trace!("frame {} presented", self.frames_presented);
        }
        self.page = (self.page + 1) % compute_pages(PAGED_BITS);
        self.arm();
    }

    /// Page currently being scanned.
    #[must_use]
    pub fn page(&self) -> usize {
        self.page
    }

    /// Frames taken over from [`Display::show`] since the scan started.
    #[must_use]
    pub fn frames_presented(&self) -> usize {
        self.frames_presented
    }

    /// The engine driving the scan.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Mutable access to the engine, e.g. to acknowledge its interrupt.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Replay the page currently armed into `preview`.
    pub fn preview_page(&self, preview: &mut Preview<ROWS, COLS>) {
        let depth = compute_panel_depth(ROWS, COLS, PWM_BITS);
        preview.accumulate(
            self.state.address.scan(),
            self.state.timers.front().scan(),
            self.state.frames.front().page(self.page, depth),
        );
    }

    fn park(&mut self) {
        let sentinel = self.state.timers.front().sentinel();
        self.engine.park(self.state.address.sentinel(), sentinel);
    }

    fn arm(&mut self) {
        let transfer = ScanTransfer::new(
            &self.state.address,
            self.state.timers.front(),
            self.state.frames.front(),
            self.page,
            compute_writes_per_plane(COLS),
        );
        self.engine.arm(&transfer);
    }
}

impl<
        const ROWS: usize,
        const COLS: usize,
        const PWM_BITS: u8,
        const PAGED_BITS: u8,
        const TABLE_LEN: usize,
        const FRAME_LEN: usize,
    > core::fmt::Debug for Matrix<ROWS, COLS, PWM_BITS, PAGED_BITS, TABLE_LEN, FRAME_LEN>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Matrix")
            .field("rows", &ROWS)
            .field("cols", &COLS)
            .field("pwm_bits", &PWM_BITS)
            .field("paged_bits", &PAGED_BITS)
            .field("brightness", &self.brightness)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "defmt")]
impl<
        const ROWS: usize,
        const COLS: usize,
        const PWM_BITS: u8,
        const PAGED_BITS: u8,
        const TABLE_LEN: usize,
        const FRAME_LEN: usize,
    > defmt::Format for Matrix<ROWS, COLS, PWM_BITS, PAGED_BITS, TABLE_LEN, FRAME_LEN>
{
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Matrix<{}x{}, {} pwm bits, {} paged bits>",
            ROWS,
            COLS,
            PWM_BITS,
            PAGED_BITS
        );
    }
}
