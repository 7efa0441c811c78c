fn main() {
    citetrack_lib::run()
}
