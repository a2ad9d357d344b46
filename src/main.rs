use clap::{arg,crate_version,value_parser,ArgMatches,Command};
use lzpack::Options;
use std::io::{Read,Write};
use std::time::Instant;

const RCH: &str = "unreachable was reached";

fn show_progress(_in_bytes: u64, _out_bytes: u64, percent: f32) {
    if percent > 0.0 {
        eprint!("\r{:.1}%",percent);
    }
}

fn open_input(cmd: &ArgMatches) -> Result<Box<dyn Read>,Box<dyn std::error::Error>> {
    match cmd.get_one::<String>("input") {
        Some(path) => Ok(Box::new(std::fs::File::open(path)?)),
        None => Ok(Box::new(std::io::stdin()))
    }
}

fn open_output(cmd: &ArgMatches) -> Result<Box<dyn Write>,Box<dyn std::error::Error>> {
    match cmd.get_one::<String>("output") {
        Some(path) => {
            if std::path::Path::new(path).exists() && !cmd.get_flag("force") {
                eprintln!("{} exists, use -f to overwrite",path);
                return Err(Box::new(std::fmt::Error));
            }
            Ok(Box::new(std::fs::File::create(path)?))
        },
        None => Ok(Box::new(std::io::stdout()))
    }
}

fn print_size(bytes: u64) -> String {
    const PREFIX: [&str;6] = ["Ki","Mi","Gi","Ti","Pi","Ei"];
    let mut scaled = bytes as f64;
    let mut prefix = "";
    for p in PREFIX {
        if scaled < 1024.0 {
            break;
        }
        scaled /= 1024.0;
        prefix = p;
    }
    match prefix {
        "" => format!("{} B",bytes),
        _ => format!("{:.1} {}B",scaled,prefix)
    }
}

fn main() -> Result<(),Box<dyn std::error::Error>>
{
    env_logger::init();
    let long_help =
"Examples:
---------
Compress:      `lzpack compress -i my_file -o my_file.lz`
Expand:        `lzpack expand -i my_file.lz -o my_file`
As a filter:   `lzpack compress < my_file > my_file.lz`";

    let mut main_cmd = Command::new("lzpack")
        .about("Compress and expand files with the LZ77 algorithm")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(Command::new("compress")
        .arg(arg!(-i --input [PATH] "input path, defaults to stdin"))
        .arg(arg!(-o --output [PATH] "output path, defaults to stdout"))
        .arg(arg!(-w --"window-size" [SIZE] "size of the sliding window")
            .value_parser(value_parser!(u16)).default_value("4096"))
        .arg(arg!(-l --"lookahead-size" [SIZE] "size of the look-ahead buffer")
            .value_parser(value_parser!(u16)).default_value("32"))
        .arg(arg!(-f --force "overwrite the output file if it exists"))
        .arg(arg!(-t --stats "show statistics when done"))
        .arg(arg!(-p --progress "report progress while running"))
        .about("compress a file"));

    main_cmd = main_cmd.subcommand(Command::new("expand")
        .arg(arg!(-i --input [PATH] "input path, defaults to stdin"))
        .arg(arg!(-o --output [PATH] "output path, defaults to stdout"))
        .arg(arg!(-f --force "overwrite the output file if it exists"))
        .arg(arg!(-t --stats "show statistics when done"))
        .arg(arg!(-p --progress "report progress while running"))
        .about("expand a file"));

    let matches = main_cmd.get_matches();

    if let Some(cmd) = matches.subcommand_matches("compress") {
        let opts = Options {
            window_size: *cmd.get_one::<u16>("window-size").expect(RCH),
            lookahead_size: *cmd.get_one::<u16>("lookahead-size").expect(RCH)
        };
        let mut input = open_input(cmd)?;
        let mut output = open_output(cmd)?;
        if cmd.get_flag("progress") {
            lzpack::set_progress_handler(Some(show_progress));
        }
        let start = Instant::now();
        let (in_size,out_size) = lzpack::compress(&mut input,&mut output,&opts)?;
        if cmd.get_flag("progress") {
            eprintln!();
        }
        if cmd.get_flag("stats") {
            let ratio = match in_size {
                0 => 0.0,
                _ => 100.0 * out_size as f64 / in_size as f64
            };
            eprintln!("compressed {} into {} ({:.1}%) in {:.2}s",
                print_size(in_size),print_size(out_size),ratio,start.elapsed().as_secs_f64());
        }
    }

    if let Some(cmd) = matches.subcommand_matches("expand") {
        let mut input = open_input(cmd)?;
        let mut output = open_output(cmd)?;
        if cmd.get_flag("progress") {
            lzpack::set_progress_handler(Some(show_progress));
        }
        let start = Instant::now();
        let (in_size,out_size) = lzpack::expand(&mut input,&mut output)?;
        if cmd.get_flag("progress") {
            eprintln!();
        }
        if cmd.get_flag("stats") {
            eprintln!("expanded {} into {} in {:.2}s",
                print_size(in_size),print_size(out_size),start.elapsed().as_secs_f64());
        }
    }

    Ok(())
}

#[test]
fn sizes_are_readable() {
    assert_eq!(print_size(0),"0 B");
    assert_eq!(print_size(1023),"1023 B");
    assert_eq!(print_size(1024),"1.0 KiB");
    assert_eq!(print_size(1536),"1.5 KiB");
    assert_eq!(print_size(3 * 1024 * 1024),"3.0 MiB");
}
