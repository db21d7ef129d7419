extern crate panfill;

extern crate clap;
use clap::*;

extern crate log;

extern crate bird_tool_utils;
use bird_tool_utils::clap_utils::*;

static PROGRAM_NAME: &str = "Panfill";

fn main() {
    let app = build_cli();
    let matches = app.get_matches();
    set_log_level(&matches, false, PROGRAM_NAME, crate_version!());

    match matches.subcommand() {
        Some(("refine", m)) => {
            set_log_level(m, true, PROGRAM_NAME, crate_version!());
            panfill::refine_argument_parsing::run_refine_subcommand(m);
        }
        _ => panic!("Programming error"),
    }
}

fn build_cli() -> Command {
    let app = add_clap_verbosity_flags(Command::new("panfill"))
        .version(crate_version!())
        .about("Fill gaps in pangenome cluster tables by merging reciprocal best homolog clusters")
        .arg_required_else_help(true);

    panfill::refine_argument_parsing::add_refine_subcommand(app)
}
