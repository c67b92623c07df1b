use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use structopt::StructOpt;

use tubec::cfg::{assign_block_ids, CFG};
use tubec::ic_text::parse_ic;
use tubec::{Optimization, Optimize};

fn main() {
    let opts = Opt::from_args();
    if let Err(e) = run(&opts) {
        eprintln!("tubec: {}", e);
        std::process::exit(1);
    }
}

fn run(opts: &Opt) -> Result<()> {
    let src = std::fs::read_to_string(&opts.path)
        .with_context(|| format!("cannot read {}", opts.path.display()))?;

    let mut program = parse_ic(&src)?;
    for var in &opts.pin {
        program.pin(parse_var(var)?);
    }

    let mut program = if opts.raw {
        program
    } else {
        program.optimize(&opts.enabled_optimizations())?
    };
    assign_block_ids(&mut program.entries);

    if let Some(dot) = &opts.dot {
        let cfg = CFG::build(&program.entries)?;
        let mut f = File::create(dot)?;
        cfg.write_graphviz(&program.entries, &mut f)?;
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if opts.blocks {
        program.print_blocks(&mut out)?;
    } else {
        program.print_ic(&mut out)?;
    }
    out.flush()?;

    Ok(())
}

fn parse_var(text: &str) -> Result<usize> {
    let digits = text.strip_prefix('s').unwrap_or(text);
    match digits.parse() {
        Ok(id) => Ok(id),
        Err(_) => bail!("'{}' is not a scalar variable", text),
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "tubec", about = "Optimize TubeIC intermediate code")]
struct Opt {
    path: PathBuf,

    #[structopt(name = "raw", long, help = "Print the program without optimizing it")]
    raw: bool,

    #[structopt(name = "no-fold", long)]
    no_fold: bool,

    #[structopt(name = "no-propagate", long)]
    no_propagate: bool,

    #[structopt(name = "no-copy", long)]
    no_copy: bool,

    #[structopt(name = "no-dce", long)]
    no_dce: bool,

    #[structopt(name = "no-unreachable", long)]
    no_unreachable: bool,

    #[structopt(name = "blocks", long, help = "Prefix every line with its basic block")]
    blocks: bool,

    #[structopt(name = "dot", long, help = "Write the control-flow graph as Graphviz")]
    dot: Option<PathBuf>,

    #[structopt(
        name = "pin",
        long,
        use_delimiter = true,
        help = "Variables whose final value must be kept, e.g. s3,s4"
    )]
    pin: Vec<String>,
}

impl Opt {
    fn enabled_optimizations(&self) -> Vec<Optimization> {
        Optimization::ALL
            .into_iter()
            .filter(|opt| match opt {
                Optimization::ConstantFolding => !self.no_fold,
                Optimization::ConstantPropagation => !self.no_propagate,
                Optimization::CopyPropagation => !self.no_copy,
                Optimization::DeadStoreElimination => !self.no_dce,
                Optimization::UnreachableCodeElimination => !self.no_unreachable,
            })
            .collect()
    }
}
