use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Builder;
use image::{Rgb, RgbImage};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{debug, info, warn, LevelFilter};
use palette::Srgb;
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use rayon::prelude::*;
use segregation_common::{CellState, Snapshot};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input snapshot file path (.bin)
    #[arg(short, long)]
    input: PathBuf,

    /// Directory receiving the rendered frames and the index chart
    #[arg(short, long, default_value = "frames")]
    output_dir: PathBuf,

    /// Optional per-step history CSV; plotted instead of the snapshot indices
    #[arg(long)]
    history: Option<PathBuf>,

    /// Edge length of one lattice cell in pixels
    #[arg(long, default_value_t = 8)]
    cell_size: u32,

    /// Color of empty cells (a color name or #rrggbb)
    #[arg(long, default_value = "white")]
    empty_color: String,

    /// Color of type A agents
    #[arg(long, default_value = "red")]
    type_a_color: String,

    /// Color of type B agents
    #[arg(long, default_value = "blue")]
    type_b_color: String,

    /// Width of the index chart in pixels
    #[arg(long, default_value_t = 800)]
    chart_width: u32,

    /// Height of the index chart in pixels
    #[arg(long, default_value_t = 600)]
    chart_height: u32,
}

/// Colors used for the three cell states.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CellColors {
    empty: Rgb<u8>,
    type_a: Rgb<u8>,
    type_b: Rgb<u8>,
}

impl CellColors {
    fn color(&self, state: CellState) -> Rgb<u8> {
        match state {
            CellState::Empty => self.empty,
            CellState::TypeA => self.type_a,
            CellState::TypeB => self.type_b,
        }
    }
}

/// Parse a color name (or `#rrggbb`) to RGB values
fn parse_color(color_name: &str) -> Rgb<u8> {
    let name = color_name.to_ascii_lowercase();
    let parsed = palette::named::from_str(&name).or_else(|| Srgb::<u8>::from_str(&name).ok());
    match parsed {
        Some(color) => Rgb([color.red, color.green, color.blue]),
        None => {
            // Default to black if color not found
            warn!("Color '{}' not recognized, using black.", color_name);
            Rgb([0, 0, 0])
        }
    }
}

/// Reads a snapshot stream: a `u32` count followed by that many snapshots.
fn read_snapshot_stream<R: Read>(mut reader: R) -> Result<Vec<Snapshot>> {
    let snapshot_count: u32 = bincode::deserialize_from(&mut reader)
        .context("Failed to read snapshot count from header")?;
    info!("Found {} snapshots in the file", snapshot_count);

    let mut snapshots = Vec::with_capacity(snapshot_count as usize);
    for i in 0..snapshot_count {
        let snapshot: Snapshot = bincode::deserialize_from(&mut reader)
            .with_context(|| format!("Failed to read snapshot {}", i))?;
        snapshots.push(snapshot);
    }
    Ok(snapshots)
}

/// Reads `step,segregation_index` rows written by the engine.
fn load_history_csv(path: &Path) -> Result<Vec<(f64, f64)>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open history file: {}", path.display()))?;
    let mut points = Vec::new();
    for record in reader.deserialize::<(f64, f64)>() {
        points.push(record.context("Malformed history row")?);
    }
    Ok(points)
}

/// Draws one snapshot as a grid of `cell_size` pixel blocks.
///
/// Returns `Ok(None)` for snapshots recorded without their cells.
fn render_frame(snapshot: &Snapshot, cell_size: u32, colors: &CellColors) -> Result<Option<RgbImage>> {
    let Some(cells) = snapshot.decoded_cells() else {
        return Ok(None);
    };
    let size = snapshot.size as usize;
    if cells.len() != size * size {
        bail!(
            "Snapshot at step {} holds {} cells, expected {} for a {}x{} lattice",
            snapshot.step,
            cells.len(),
            size * size,
            size,
            size
        );
    }

    let cell_size = cell_size.max(1);
    let Some(side) = snapshot.size.checked_mul(cell_size) else {
        bail!(
            "A {}x{} lattice at {} pixels per cell does not fit in an image",
            snapshot.size,
            snapshot.size,
            cell_size
        );
    };
    let mut image = RgbImage::from_pixel(side, side, colors.empty);

    for (idx, state) in cells.into_iter().enumerate() {
        let Some(state) = state else {
            bail!("Snapshot at step {} holds an unknown cell code at index {}", snapshot.step, idx);
        };
        if state == CellState::Empty {
            continue;
        }
        let color = colors.color(state);
        let x0 = (idx % size) as u32 * cell_size;
        let y0 = (idx / size) as u32 * cell_size;
        for y in y0..y0 + cell_size {
            for x in x0..x0 + cell_size {
                image.put_pixel(x, y, color);
            }
        }
    }

    Ok(Some(image))
}

fn frame_path(output_dir: &Path, snapshot: &Snapshot) -> PathBuf {
    output_dir.join(format!("step_{:06}.png", snapshot.step))
}

/// Line chart of the segregation index against the simulation step.
fn plot_history(path: &Path, points: &[(f64, f64)], width: u32, height: u32) -> Result<()> {
    let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
    root.fill(&WHITE)?;

    let max_step = points.iter().map(|&(step, _)| step).fold(1.0, f64::max);
    let mut chart = ChartBuilder::on(&root)
        .caption("Segregation index over time", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(0f64..max_step, 0f64..1f64)?;

    chart
        .configure_mesh()
        .x_desc("Simulation step")
        .y_desc("Segregation index")
        .draw()?;
    chart.draw_series(LineSeries::new(points.iter().copied(), &BLUE))?;

    root.present()?;
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    run_with_args(args)
}

fn run_with_args(args: Args) -> Result<()> {
    // Initialize logger
    Builder::from_default_env()
        .filter(None, LevelFilter::Info)
        .init();

    info!("Starting Segregation Visualizer...");
    info!("Input file: {}", args.input.display());
    info!("Output directory: {}", args.output_dir.display());

    let colors = CellColors {
        empty: parse_color(&args.empty_color),
        type_a: parse_color(&args.type_a_color),
        type_b: parse_color(&args.type_b_color),
    };
    debug!("Cell colors: {:?}", colors);

    // --- Open and Parse Snapshot File ---
    let input_file = File::open(&args.input)
        .with_context(|| format!("Failed to open input file: {}", args.input.display()))?;
    let snapshots = read_snapshot_stream(BufReader::new(input_file))?;

    if snapshots.is_empty() {
        warn!("Input file contains no snapshots. Exiting.");
        return Ok(());
    }

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create output directory: {}", args.output_dir.display()))?;

    // Set up progress bar
    let progress_bar = ProgressBar::new(snapshots.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) [{eta}]")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let start_time = Instant::now();

    // --- Render Frames (Parallel) ---
    let rendered: Vec<bool> = snapshots
        .par_iter()
        .progress_with(progress_bar.clone())
        .map(|snapshot| -> Result<bool> {
            match render_frame(snapshot, args.cell_size, &colors)? {
                Some(image) => {
                    let path = frame_path(&args.output_dir, snapshot);
                    image
                        .save(&path)
                        .with_context(|| format!("Failed to write frame {}", path.display()))?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .collect::<Result<_>>()?;
    let frame_count = rendered.iter().filter(|&&r| r).count();
    progress_bar.finish_with_message(format!("Rendered {} frames", frame_count));

    if frame_count == 0 {
        warn!("No snapshots contain cell data! No frames were written.");
        warn!("Enable save_cells_in_snapshot in the engine's output config.");
    } else {
        info!("Rendered {} of {} snapshots", frame_count, snapshots.len());
    }

    // --- Plot Segregation Index ---
    let points = match &args.history {
        Some(path) => load_history_csv(path)?,
        None => snapshots
            .iter()
            .map(|s| (s.step as f64, s.segregation_index))
            .collect(),
    };
    let chart_path = args.output_dir.join("segregation_index.png");
    plot_history(&chart_path, &points, args.chart_width, args.chart_height)?;
    info!("Segregation index chart saved to {}", chart_path.display());

    let duration = start_time.elapsed();
    info!("Visualization completed in {:.2?}", duration);

    Ok(())
}

// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use segregation_common::CellCounts;
    use std::io::{Cursor, Write};

    fn colors() -> CellColors {
        CellColors {
            empty: Rgb([255, 255, 255]),
            type_a: Rgb([255, 0, 0]),
            type_b: Rgb([0, 0, 255]),
        }
    }

    fn snapshot(step: u32, cells: Option<Vec<u8>>) -> Snapshot {
        Snapshot {
            step,
            size: 2,
            segregation_index: 0.5,
            unhappy_count: 1,
            counts: CellCounts { empty: 1, type_a: 2, type_b: 1 },
            cells,
        }
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("red"), Rgb([255, 0, 0]));
        assert_eq!(parse_color("White"), Rgb([255, 255, 255]));
        assert_eq!(parse_color("#00ff80"), Rgb([0, 255, 128]));
        assert_eq!(parse_color("not-a-color"), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_render_frame_blocks() {
        let image = render_frame(&snapshot(3, Some(vec![1, 0, 2, 1])), 4, &colors())
            .unwrap()
            .unwrap();
        assert_eq!(image.dimensions(), (8, 8));
        assert_eq!(*image.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(3, 3), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(4, 0), Rgb([255, 255, 255]));
        assert_eq!(*image.get_pixel(1, 5), Rgb([0, 0, 255]));
        assert_eq!(*image.get_pixel(7, 7), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_render_frame_without_cells() {
        assert!(render_frame(&snapshot(0, None), 4, &colors()).unwrap().is_none());
    }

    #[test]
    fn test_render_frame_rejects_bad_cells() {
        assert!(render_frame(&snapshot(0, Some(vec![1, 0, 2])), 4, &colors()).is_err());
        assert!(render_frame(&snapshot(0, Some(vec![1, 0, 2, 7])), 4, &colors()).is_err());
    }

    #[test]
    fn test_render_frame_rejects_oversized_image() {
        let err = render_frame(&snapshot(0, Some(vec![1, 0, 2, 1])), u32::MAX, &colors()).unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn test_read_snapshot_stream() {
        let snapshots = vec![snapshot(0, Some(vec![1, 0, 2, 1])), snapshot(10, None)];
        let mut buffer = Vec::new();
        bincode::serialize_into(&mut buffer, &(snapshots.len() as u32)).unwrap();
        for s in &snapshots {
            bincode::serialize_into(&mut buffer, s).unwrap();
        }

        let read = read_snapshot_stream(Cursor::new(buffer)).unwrap();
        assert_eq!(read, snapshots);
    }

    #[test]
    fn test_truncated_stream_fails() {
        let mut buffer = Vec::new();
        bincode::serialize_into(&mut buffer, &3u32).unwrap();
        bincode::serialize_into(&mut buffer, &snapshot(0, None)).unwrap();
        assert!(read_snapshot_stream(Cursor::new(buffer)).is_err());
    }

    #[test]
    fn test_load_history_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "step,segregation_index\n1,0.500000\n2,0.625000\n").unwrap();
        let points = load_history_csv(file.path()).unwrap();
        assert_eq!(points, vec![(1.0, 0.5), (2.0, 0.625)]);
    }

    #[test]
    fn test_frame_path() {
        let path = frame_path(Path::new("out"), &snapshot(42, None));
        assert_eq!(path, PathBuf::from("out/step_000042.png"));
    }
}
