//! Landlock wrapper binary.
//!
//! Builds the Landlock policy, commits it to itself, then executes the
//! target command under it.
//!
//! Usage:
//!   cage-landlock --home /home/alice \
//!                 --rule "landlock.write /srv/data" \
//!                 --profile app.profile \
//!                 -- command arg1 arg2

fn main() -> ! {
    cage_landlock::run_main()
}
