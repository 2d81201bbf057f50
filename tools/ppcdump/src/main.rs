//! gekko-ppcdump: disassemble a raw guest code image and optionally show
//! the host code the JIT produces for it.

use std::env;
use std::fs;
use std::io::{self, BufWriter, Write};

use anyhow::{bail, Context, Result};
use gekko_core::JitConfig;
use gekko_disas::{render_at, NO_MEMORY};
use gekko_exec::{Jit, Memory};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage: gekko-ppcdump <image> [options]

Options:
  --base <hex>       Guest address of the first byte (default: 0x80003100)
  --start <hex>      First address to disassemble (default: base)
  --count <n>        Instructions to print (default: whole image)
  --le               Image words are little-endian
  --jit              Also compile the block at --start and dump host code
  --max-insns <n>    Block size limit for --jit (default: 256)
  -h, --help         Show this help";

struct Args {
    image: String,
    base: u32,
    start: Option<u32>,
    count: Option<usize>,
    big_endian: bool,
    jit: bool,
    max_insns: usize,
}

fn parse_hex(s: &str) -> Result<u32> {
    let digits = s.trim_start_matches("0x");
    u32::from_str_radix(digits, 16).with_context(|| format!("invalid hex address `{s}`"))
}

fn parse_args() -> Result<Option<Args>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(first) = args.first() else {
        bail!("{USAGE}");
    };
    if first == "-h" || first == "--help" {
        eprintln!("{USAGE}");
        return Ok(None);
    }

    let mut a = Args {
        image: first.clone(),
        base: 0x8000_3100,
        start: None,
        count: None,
        big_endian: true,
        jit: false,
        max_insns: 256,
    };

    let mut it = args[1..].iter();
    while let Some(flag) = it.next() {
        let mut value = || {
            it.next()
                .with_context(|| format!("{flag} needs a value"))
        };
        match flag.as_str() {
            "--base" => a.base = parse_hex(value()?)?,
            "--start" => a.start = Some(parse_hex(value()?)?),
            "--count" => a.count = Some(value()?.parse().context("invalid count")?),
            "--max-insns" => a.max_insns = value()?.parse().context("invalid max-insns")?,
            "--le" => a.big_endian = false,
            "--jit" => a.jit = true,
            other => bail!("unknown option: {other}\n\n{USAGE}"),
        }
    }
    Ok(Some(a))
}

/// Guest memory holding the image at `--base`, words in guest order.
fn load_image(args: &Args, image: &[u8]) -> Result<Memory> {
    let mut mem = Memory::default();
    let bytes: Vec<u8> = if args.big_endian {
        image.to_vec()
    } else {
        image
            .chunks_exact(4)
            .flat_map(|c| [c[3], c[2], c[1], c[0]])
            .collect()
    };
    mem.load(args.base, &bytes)
        .map_err(|f| anyhow::anyhow!("image does not fit in RAM at {:#010x}", f.address))?;
    Ok(mem)
}

/// Addresses past the end of RAM print as `(no memory)`.
fn dump_guest(args: &Args, image: &[u8], mem: &mut Memory, w: &mut impl Write) -> Result<()> {
    let start = args.start.unwrap_or(args.base);
    let Some(skip) = start.checked_sub(args.base).map(|s| s as usize) else {
        bail!("start {start:#010x} is below base {:#010x}", args.base);
    };
    let count = args
        .count
        .unwrap_or_else(|| image.len().saturating_sub(skip) / 4);

    for i in 0..count {
        let address = start.wrapping_add(i as u32 * 4);
        match render_at(mem, address) {
            Some((word, d)) => {
                writeln!(w, "{address:08x}  {word:08x}  {:<10} {}", d.mnemonic, d.operands)?
            }
            None => writeln!(w, "{address:08x}  {:8}  {NO_MEMORY}", "")?,
        }
    }
    Ok(())
}

fn dump_host(args: &Args, mem: &mut Memory, w: &mut impl Write) -> Result<()> {
    let start = args.start.unwrap_or(args.base);
    let config = JitConfig::default().with_max_block_instructions(args.max_insns);
    let mut jit = Jit::new(config)?;
    let Some(id) = jit.compile_at(mem, start)? else {
        bail!("no code at {start:#010x}");
    };

    let block = jit.cache().get(id);
    writeln!(
        w,
        "\n-- block {:#010x}: {} guest instructions, checked entry {:#x}, normal entry {:#x}",
        block.guest_start, block.guest_instruction_count, block.checked_entry, block.normal_entry
    )?;
    for (offset, op) in jit.host_code(id)? {
        writeln!(w, "{offset:8x}  {op}")?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };
    let image = fs::read(&args.image).with_context(|| format!("reading {}", args.image))?;

    let stdout = io::stdout();
    let mut w = BufWriter::new(stdout.lock());
    let mut mem = load_image(&args, &image)?;
    dump_guest(&args, &image, &mut mem, &mut w)?;
    if args.jit {
        dump_host(&args, &mut mem, &mut w)?;
    }
    w.flush()?;
    Ok(())
}
