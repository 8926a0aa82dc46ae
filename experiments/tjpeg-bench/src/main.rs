use std::time::Instant;
use tjpeg::{Jpeg, PixelFormat};
use tjpeg_base::log;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tjpeg_base::init_stdout_logger();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <jpeg-file> [threads] [iterations]", args[0]);
        std::process::exit(1);
    }

    let path = &args[1];
    let threads: usize = match args.get(2) {
        Some(s) => s.parse()?,
        None => std::thread::available_parallelism().map_or(1, |n| n.get()),
    };
    let iterations: usize = match args.get(3) {
        Some(s) => s.parse()?,
        None => 100,
    };
    if threads == 0 || iterations == 0 {
        eprintln!("threads and iterations must be positive");
        std::process::exit(1);
    }

    let pool = tjpeg::decompressor_pool()?;
    let data = std::fs::read(path)?;

    let header = Jpeg::from_bytes(&pool, &data).parse_header()?;
    log::info!(
        "{}: {}x{} {:?}, {} bytes",
        path,
        header.width,
        header.height,
        header.subsampling,
        data.len()
    );

    let start = Instant::now();
    std::thread::scope(|scope| -> Result<(), tjpeg::TurboError> {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                let pool = &pool;
                let data = &data;
                scope.spawn(move || -> Result<(), tjpeg::TurboError> {
                    for _ in 0..iterations {
                        let mut jpeg = Jpeg::from_bytes(pool, data.as_slice());
                        jpeg.decode(PixelFormat::Rgb)?;
                    }
                    Ok(())
                })
            })
            .collect();
        for worker in workers {
            match worker.join() {
                Ok(result) => result?,
                Err(_) => log::error!("decode worker panicked"),
            }
        }
        Ok(())
    })?;
    let elapsed = start.elapsed();

    let total = threads * iterations;
    log::info!(
        "decoded {} images on {} threads in {:.3}s ({:.1} images/s)",
        total,
        threads,
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
    log::info!("{} idle decompressors after the run", pool.idle_count());

    let destroyed = pool.clear();
    log::info!("destroyed {} decompressors", destroyed);
    Ok(())
}
