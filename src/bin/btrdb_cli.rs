use std::{
    error::Error,
    io, process,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use btrdb::{
    ClientError, Command, Connection, ConnectionConfig, cli::PromptError, prompt,
    protocol::DEFAULT_CHUNK_SIZE,
};
use clap::Parser;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Address of the BTrDB server, e.g. localhost:4410
    address: String,
    /// Bytes requested per read from the server
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// Give up waiting for a response after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let config = ConnectionConfig::default()
        .read_chunk_size(cli.chunk_size)
        .read_timeout(cli.timeout_ms.map(Duration::from_millis));
    let conn = Arc::new(Connection::open(&cli.address, config)?);

    // Ctrl-C closes the connection, which wakes a call stuck waiting on the
    // server. At the prompt there is nothing to wake, so exit right away.
    let busy = Arc::new(AtomicBool::new(false));
    {
        let conn = Arc::clone(&conn);
        let busy = Arc::clone(&busy);
        ctrlc::set_handler(move || {
            if let Err(e) = conn.close() {
                eprintln!("failed to close connection: {e}");
            }
            if !busy.load(Ordering::SeqCst) {
                eprintln!("\nconnection closed");
                process::exit(130);
            }
        })?;
    }

    let mut ctx = conn.new_context();
    let stdin = io::stdin();
    let stdout = io::stdout();

    loop {
        let writer = StdOut {
            inner: stdout.lock(),
        };

        let cmd = match prompt(stdin.lock(), writer) {
            Ok(c) => c,
            Err(PromptError::Io(e)) => return Err(e.into()),
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        if !conn.is_alive() {
            eprintln!("connection closed");
            break;
        }
        if let Command::Exit = cmd {
            break;
        }

        busy.store(true, Ordering::SeqCst);
        let res = cmd.execute(&mut ctx);
        busy.store(false, Ordering::SeqCst);

        match res {
            Ok(out) if out.is_empty() => {}
            Ok(out) => println!("{out}"),
            Err(e @ (ClientError::ConnectionClosed | ClientError::ConnectionBroken(_))) => {
                eprintln!("{e}");
                break;
            }
            Err(e) => eprintln!("query error: {e}"),
        }
    }

    ctx.destroy();
    conn.close()?;
    Ok(())
}

/// StdOut wrapper that automatically flushes content after every write.
struct StdOut<W: io::Write> {
    inner: W,
}

impl<W: io::Write> io::Write for StdOut<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let res = self.inner.write(buf);
        if res.is_ok() {
            self.inner.flush()?
        }
        res
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
