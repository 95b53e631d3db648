// =============================================================================
// SLOT RENDERER DEMO
// =============================================================================
//
// Fills every texture slot with a procedural checkerboard, binds each slot's
// descriptor set, then cycles through the slots while the window is open.
//
// FRAME FLOW:
// 1. Pump OS messages (stop when the window closes)
// 2. Rebuild the swapchain if the surface was resized
// 3. Wait for the frame's fence, acquire, record, submit, present
//
// Every few seconds slot 0 is reloaded with a new pattern to exercise the
// overwrite -> rebind -> release path.
//
// =============================================================================

use anyhow::{Context, Result};
use glam::Vec3;
use std::time::{Duration, Instant};

use slot_renderer::backend::AllocatedImage;
use slot_renderer::{Config, PlatformWindow, RenderResult, Renderer};

const TEXTURE_SIZE: u32 = 64;
const SLOT_INTERVAL: Duration = Duration::from_secs(1);
const RELOAD_INTERVAL: Duration = Duration::from_secs(5);

const PALETTE: [[u8; 3]; 6] = [
    [230, 57, 70],
    [241, 250, 238],
    [69, 123, 157],
    [255, 183, 3],
    [42, 157, 143],
    [131, 56, 236],
];

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    // Initialize logging
    init_logging(&config);
    log::info!("Starting slot renderer");
    log::info!("Window: {}x{}", config.window.width, config.window.height);
    log::info!("Present mode: {}", config.graphics.present_mode);

    // The window must outlive the renderer's surface: declared first, dropped last
    let mut platform = PlatformWindow::new(&config.window).context("Failed to open window")?;
    let mut renderer = Renderer::new(&platform, &config).context("Failed to initialize Vulkan")?;

    let loaded = fill_slots(&mut renderer)?;
    if loaded.is_empty() {
        anyhow::bail!("No texture slot could be loaded");
    }
    renderer.update_camera(Vec3::new(0.0, 0.0, 1.5))?;

    run(&mut platform, &mut renderer, &loaded)?;

    log::info!("Shutting down");
    Ok(())
}

/// Initialize logging: config level by default, RUST_LOG wins when set
fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::new();
    builder.filter_level(config.log_level());
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// TEXTURES
// =============================================================================

/// RGBA8 checkerboard with `cell`-pixel squares
fn checkerboard(size: u32, cell: u32, a: [u8; 3], b: [u8; 3]) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let [r, g, b] = if (x / cell + y / cell) % 2 == 0 { a } else { b };
            pixels.extend_from_slice(&[r, g, b, 255]);
        }
    }
    pixels
}

fn pattern_for(slot: usize, generation: usize) -> Vec<u8> {
    let a = PALETTE[(slot + generation) % PALETTE.len()];
    let b = PALETTE[(slot + generation + 1) % PALETTE.len()];
    let cell = 4 << (slot % 3);
    checkerboard(TEXTURE_SIZE, cell, a, b)
}

/// Load and bind every slot. Slots that fail to load are skipped.
fn fill_slots(renderer: &mut Renderer) -> Result<Vec<usize>> {
    let mut loaded = Vec::new();

    for slot in 0..renderer.max_image_texture_num() {
        let pixels = pattern_for(slot, 0);
        match renderer.load_image_texture(&pixels, TEXTURE_SIZE, TEXTURE_SIZE, slot) {
            Ok(_) => {
                renderer.bind_texture(slot)?;
                loaded.push(slot);
            }
            Err(e) if !e.is_fatal() => log::warn!("Skipping slot {}: {}", slot, e),
            Err(e) => return Err(e.into()),
        }
    }

    log::info!("Loaded {} texture slots", loaded.len());
    Ok(loaded)
}

/// Overwrite slot 0, point its descriptor at the new image, free the old ones.
///
/// Displaced images wait in `stale` until a bind succeeds: until then the
/// descriptor may still reference one of them.
fn reload_first_slot(
    renderer: &mut Renderer,
    generation: usize,
    stale: &mut Vec<AllocatedImage>,
) -> RenderResult<()> {
    let pixels = pattern_for(0, generation);
    if let Some(old) = renderer.load_image_texture(&pixels, TEXTURE_SIZE, TEXTURE_SIZE, 0)? {
        stale.push(old);
    }
    renderer.bind_texture(0)?;
    release_stale(renderer, stale)?;
    log::debug!("Reloaded slot 0 (generation {})", generation);
    Ok(())
}

fn release_stale(renderer: &mut Renderer, stale: &mut Vec<AllocatedImage>) -> RenderResult<()> {
    while let Some(old) = stale.pop() {
        renderer.release_texture(old)?;
    }
    Ok(())
}

/// Log and swallow a warning; fatal errors keep propagating
fn tolerate(result: RenderResult<()>, what: &str) -> RenderResult<()> {
    match result {
        Err(e) if !e.is_fatal() => {
            log::warn!("{} failed: {}", what, e);
            Ok(())
        }
        other => other,
    }
}

// =============================================================================
// MAIN LOOP
// =============================================================================

fn run(platform: &mut PlatformWindow, renderer: &mut Renderer, loaded: &[usize]) -> Result<()> {
    let mut shown = 0;
    let mut generation = 0;
    let mut last_switch = Instant::now();
    let mut last_reload = Instant::now();
    let mut stale = Vec::new();
    let mut frames = 0u32;
    let mut last_fps = Instant::now();

    while platform.do_events() {
        if let Some((width, height)) = platform.take_resize() {
            renderer.resize(width, height)?;
        }

        if last_switch.elapsed() >= SLOT_INTERVAL {
            shown = (shown + 1) % loaded.len();
            last_switch = Instant::now();
        }

        if loaded.contains(&0) && last_reload.elapsed() >= RELOAD_INTERVAL {
            generation += 1;
            tolerate(reload_first_slot(renderer, generation, &mut stale), "Slot 0 reload")
                .context("Reload error")?;
            last_reload = Instant::now();
        }

        match renderer.render_frame(loaded[shown]) {
            Ok(()) => frames += 1,
            Err(e) if !e.is_fatal() => log::warn!("Frame skipped: {}", e),
            Err(e) => return Err(e).context("Render error"),
        }

        if last_fps.elapsed() >= Duration::from_secs(1) {
            platform.set_title(&format!("Slot Renderer | slot {} | {} FPS", loaded[shown], frames));
            frames = 0;
            last_fps = Instant::now();
        }
    }

    release_stale(renderer, &mut stale)?;
    Ok(())
}
