#[rocket::launch]
fn rocket() -> _ {
    starterkit_api::rocket()
}
